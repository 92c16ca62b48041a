use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scores at or above this are reliable; below it content may be reported.
pub const RELIABLE_THRESHOLD: f64 = 70.0;

pub const CHECKED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckKind {
    Url,
    Image,
    /// Anything else a remote source sends us.
    #[serde(other)]
    Other,
}

impl CheckKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Url => "URL",
            CheckKind::Image => "IMAGE",
            CheckKind::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "URL" => Some(CheckKind::Url),
            "IMAGE" => Some(CheckKind::Image),
            _ => None,
        }
    }
}

/// One stored evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    pub id: i64,
    pub kind: CheckKind,
    /// The checked URL, or the image URI for image checks.
    #[serde(default)]
    pub subject_identifier: String,
    pub reliability_score: f64,
    pub is_reliable: bool,
    #[serde(with = "checked_at_format")]
    pub checked_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_image_path: Option<String>,
    /// Serialized evidence list, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl CheckRecord {
    /// Builds a record created at `created_at`. The id is the creation time in
    /// epoch milliseconds; `checked_at` keeps second precision.
    pub fn new(
        kind: CheckKind,
        subject_identifier: impl Into<String>,
        reliability_score: f64,
        created_at: DateTime<Local>,
    ) -> Self {
        let checked_at = created_at.naive_local();
        let checked_at = checked_at.with_nanosecond(0).unwrap_or(checked_at);
        let reliability_score = clamp_percentage(reliability_score);

        Self {
            id: created_at.timestamp_millis(),
            kind,
            subject_identifier: subject_identifier.into(),
            reliability_score,
            is_reliable: reliability_score >= RELIABLE_THRESHOLD,
            checked_at,
            saved_image_path: None,
            evidence: None,
        }
    }

    /// Attaches the local copy of a checked image. Only unreliable image checks
    /// keep it, since only those can be reported.
    pub fn with_saved_image_path(mut self, path: Option<String>) -> Self {
        self.saved_image_path = if self.kind == CheckKind::Image && !self.is_reliable {
            path.filter(|p| !p.is_empty())
        } else {
            None
        };
        self
    }

    pub fn with_evidence(mut self, evidence: Option<String>) -> Self {
        self.evidence = evidence;
        self
    }

    /// Key used to collapse repeated checks of the same subject.
    pub fn dedup_key(&self) -> String {
        if self.subject_identifier.is_empty() {
            format!("__id_{}", self.id)
        } else {
            self.subject_identifier.clone()
        }
    }

    pub fn is_low_score(&self) -> bool {
        self.reliability_score < RELIABLE_THRESHOLD
    }
}

/// Converts a remote score field into a 0-100 percentage. Remote sources send
/// integers, fractions or strings; fractions (`<= 1`) are scaled up.
/// Unparseable values count as 0.
pub fn normalize_score(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    match raw {
        Some(v) if v.is_finite() => {
            let percent = if v > 1.0 { v } else { v * 100.0 };
            clamp_percentage(percent)
        }
        _ => {
            tracing::warn!("Unexpected reliability score value: {}", value);
            0.0
        }
    }
}

fn clamp_percentage(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Parses a `checkedAt` string. Accepts the stored format as well as the
/// minute-precision dotted form older server builds send.
pub fn parse_checked_at(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, CHECKED_AT_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y.%m.%d %H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

pub(crate) mod checked_at_format {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    use super::{parse_checked_at, CHECKED_AT_FORMAT};

    pub fn serialize<S>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.format(CHECKED_AT_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_checked_at(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid checkedAt: {s}")))
    }
}
