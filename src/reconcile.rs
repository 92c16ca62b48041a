use std::time::Duration;

use tokio::time::timeout;

use crate::error::Result;
use crate::ledger::{dedup_by_subject, sort_newest_first, CheckRecordLedger};
use crate::models::{parse_checked_at, CheckKind, CheckRecord, Identity, RELIABLE_THRESHOLD};
use crate::services::RemoteHistory;

/// Where the records of a [`View`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSource {
    Local,
    Remote,
    /// Illustrative placeholders. Never written to the ledger.
    Seed,
}

impl ViewSource {
    pub fn label(self) -> &'static str {
        match self {
            ViewSource::Local => "local",
            ViewSource::Remote => "remote",
            ViewSource::Seed => "sample",
        }
    }
}

#[derive(Debug, Clone)]
pub struct View {
    pub source: ViewSource,
    pub records: Vec<CheckRecord>,
}

impl View {
    pub fn is_seed(&self) -> bool {
        self.source == ViewSource::Seed
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats::from_records(&self.records)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStats {
    pub total: usize,
    pub reliable: usize,
    pub unreliable: usize,
}

impl HistoryStats {
    pub fn from_records(records: &[CheckRecord]) -> Self {
        let reliable = records.iter().filter(|r| r.is_reliable).count();
        Self {
            total: records.len(),
            reliable,
            unreliable: records.len() - reliable,
        }
    }
}

// (id, kind, subject, score, checked_at)
const SEED: [(i64, CheckKind, &str, f64, &str); 3] = [
    (1, CheckKind::Url, "https://news.example.com/covid19-vaccine", 85.5, "2024.11.14 15:30"),
    (2, CheckKind::Image, "", 42.3, "2024.11.13 09:15"),
    (3, CheckKind::Url, "https://sports.example.com/result", 91.2, "2024.11.12 20:45"),
];

pub fn seed_records() -> Vec<CheckRecord> {
    SEED.iter()
        .filter_map(|&(id, kind, subject, score, at)| {
            Some(CheckRecord {
                id,
                kind,
                subject_identifier: subject.to_string(),
                reliability_score: score,
                is_reliable: score >= RELIABLE_THRESHOLD,
                checked_at: parse_checked_at(at)?,
                saved_image_path: None,
                evidence: None,
            })
        })
        .collect()
}

/// Read-time choice between local history, the remote copy and seed data.
pub struct ReconciliationPolicy<R> {
    history: CheckRecordLedger,
    remote: Option<R>,
    remote_timeout: Duration,
}

impl<R: RemoteHistory> ReconciliationPolicy<R> {
    pub fn new(history: CheckRecordLedger, remote: Option<R>, remote_timeout: Duration) -> Self {
        Self {
            history,
            remote,
            remote_timeout,
        }
    }

    /// Local history when there is any; otherwise the remote history, and
    /// failing that the seed set. Only local storage errors propagate.
    pub async fn view(&self, identity: Option<&Identity>) -> Result<View> {
        let local = self.history.list(identity).await?;
        if !local.is_empty() {
            return Ok(View {
                source: ViewSource::Local,
                records: local,
            });
        }

        if let Some(mut records) = self.fetch_remote(identity).await {
            sort_newest_first(&mut records);
            return Ok(View {
                source: ViewSource::Remote,
                records: dedup_by_subject(records),
            });
        }

        Ok(View {
            source: ViewSource::Seed,
            records: seed_records(),
        })
    }

    async fn fetch_remote(&self, identity: Option<&Identity>) -> Option<Vec<CheckRecord>> {
        let (Some(remote), Some(identity)) = (self.remote.as_ref(), identity) else {
            return None;
        };

        match timeout(self.remote_timeout, remote.fetch_history(identity)).await {
            Ok(Ok(records)) if !records.is_empty() => Some(records),
            Ok(Ok(_)) => {
                tracing::debug!("Remote history is empty, using sample data");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!("Remote history unavailable: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "Remote history timed out after {}s",
                    self.remote_timeout.as_secs()
                );
                None
            }
        }
    }
}
