use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointCategory {
    UrlCheck,
    ImageCheck,
    Report,
    Redemption,
}

impl PointCategory {
    /// Categories that count against the daily earning cap.
    pub fn is_check(self) -> bool {
        matches!(self, PointCategory::UrlCheck | PointCategory::ImageCheck)
    }

    pub fn label(self) -> &'static str {
        match self {
            PointCategory::UrlCheck => "URL check",
            PointCategory::ImageCheck => "Image check",
            PointCategory::Report => "Report",
            PointCategory::Redemption => "Redemption",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTransaction {
    #[serde(rename = "type")]
    pub category: PointCategory,
    pub points: i64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, rename = "description", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PointTransaction {
    pub fn new(category: PointCategory, points: i64, timestamp: i64) -> Self {
        Self {
            category,
            points,
            timestamp,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Local calendar day the transaction falls on.
    pub fn local_day(&self) -> Option<NaiveDate> {
        Local
            .timestamp_millis_opt(self.timestamp)
            .single()
            .map(|dt| dt.date_naive())
    }

    pub fn occurred_at(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.timestamp).single()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voucher {
    pub name: &'static str,
    pub cost: i64,
}

pub const VOUCHERS: [Voucher; 4] = [
    Voucher {
        name: "1,000 KRW gift voucher",
        cost: 1_000,
    },
    Voucher {
        name: "3,000 KRW gift voucher",
        cost: 3_000,
    },
    Voucher {
        name: "5,000 KRW gift voucher",
        cost: 5_000,
    },
    Voucher {
        name: "10,000 KRW gift voucher",
        cost: 10_000,
    },
];

impl Voucher {
    pub fn by_cost(cost: i64) -> Option<Voucher> {
        VOUCHERS.iter().copied().find(|v| v.cost == cost)
    }
}
