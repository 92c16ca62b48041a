use std::io::ErrorKind;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::ledger::{PointLedger, ReportStateTracker, REPORT_REWARD};
use crate::models::{CheckRecord, Identity};

use super::transport::{ReportMessage, ReportTransport};

/// `Draft` → `Submitted` → `PendingConfirmation` → `Confirmed`. Deferring
/// goes back to `Submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    Draft,
    Submitted,
    PendingConfirmation,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub record: CheckRecord,
    pub reporter_name: String,
    pub reporter_email: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportReceipt {
    pub record_id: i64,
    pub points_awarded: i64,
    pub image_removed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFlow {
    draft: ReportDraft,
    state: ReportState,
    #[serde(default)]
    submitted_at: Option<i64>,
}

impl ReportFlow {
    pub fn new(draft: ReportDraft) -> Self {
        Self {
            draft,
            state: ReportState::Draft,
            submitted_at: None,
        }
    }

    pub fn state(&self) -> ReportState {
        self.state
    }

    pub fn draft(&self) -> &ReportDraft {
        &self.draft
    }

    pub fn record_id(&self) -> i64 {
        self.draft.record.id
    }

    pub fn submitted_at(&self) -> Option<i64> {
        self.submitted_at
    }

    fn expect_state(&self, expected: ReportState, action: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }

    // Already-reported content is rejected before anything is sent.
    pub async fn submit<T: ReportTransport>(
        &mut self,
        identity: Option<&Identity>,
        tracker: &ReportStateTracker,
        transport: &T,
        recipient: &str,
        now: DateTime<Local>,
    ) -> Result<ReportMessage> {
        self.expect_state(ReportState::Draft, "submit")?;

        if tracker.is_reported(identity, &self.draft.record).await? {
            return Err(AppError::AlreadyReported(self.draft.record.dedup_key()));
        }

        let message = ReportMessage::compose(&self.draft, recipient);
        transport.hand_off(&message)?;

        self.state = ReportState::Submitted;
        self.submitted_at = Some(now.timestamp_millis());
        tracing::debug!("Report for record {} handed off", self.record_id());
        Ok(message)
    }

    pub fn resume(&mut self) -> Result<()> {
        self.expect_state(ReportState::Submitted, "resume")?;
        self.state = ReportState::PendingConfirmation;
        Ok(())
    }

    pub fn defer(&mut self) -> Result<()> {
        self.expect_state(ReportState::PendingConfirmation, "defer")?;
        self.state = ReportState::Submitted;
        Ok(())
    }

    pub async fn confirm(
        &mut self,
        identity: Option<&Identity>,
        tracker: &ReportStateTracker,
        points: &PointLedger,
        now: DateTime<Local>,
    ) -> Result<ReportReceipt> {
        self.expect_state(ReportState::PendingConfirmation, "confirm")?;

        if !tracker.mark_reported(identity, &self.draft.record).await? {
            if tracker.accepts(identity) {
                return Err(AppError::AlreadyReported(self.draft.record.dedup_key()));
            }
            return Err(AppError::MissingIdentity);
        }

        let points_awarded = if points.credit_report(identity, now).await? {
            REPORT_REWARD
        } else {
            0
        };

        let image_removed = match &self.draft.record.saved_image_path {
            Some(path) => remove_report_image(path).await,
            None => false,
        };

        self.state = ReportState::Confirmed;
        tracing::info!(
            "Report confirmed for record {}, +{}P",
            self.record_id(),
            points_awarded
        );

        Ok(ReportReceipt {
            record_id: self.record_id(),
            points_awarded,
            image_removed,
        })
    }
}

pub(crate) async fn remove_report_image(path: &str) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!("Removed report image {}", path);
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!("Failed to remove report image {}: {}", path, e);
            false
        }
    }
}
