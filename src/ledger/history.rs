use std::collections::HashSet;
use std::sync::Arc;

use crate::db::{Mutation, ScopedStore};
use crate::error::Result;
use crate::models::{CheckRecord, Collection, Identity, ScopeKey};

pub const HISTORY_LIMIT: usize = 50;

pub const DUPLICATE_WINDOW_SECS: i64 = 5 * 60;

#[derive(Clone)]
pub struct CheckRecordLedger {
    store: Arc<ScopedStore>,
}

impl CheckRecordLedger {
    pub fn new(store: Arc<ScopedStore>) -> Self {
        Self { store }
    }

    /// Returns the record as stored; its id may have been bumped.
    pub async fn insert(
        &self,
        identity: Option<&Identity>,
        candidate: CheckRecord,
    ) -> Result<Option<CheckRecord>> {
        let Some(identity) = identity else {
            tracing::warn!("Ignoring check record without a logged-in user");
            return Ok(None);
        };

        let scope = ScopeKey::User(identity.clone());
        let subject = candidate.subject_identifier.clone();

        let stored = self
            .store
            .modify(Collection::CheckHistory, &scope, move |records: &mut Vec<CheckRecord>| {
                if records.iter().any(|existing| is_duplicate(existing, &candidate)) {
                    return Mutation::Skip(None);
                }

                let mut candidate = candidate;
                if let Some(max_id) = records.iter().map(|r| r.id).max() {
                    if candidate.id <= max_id {
                        candidate.id = max_id + 1;
                    }
                }

                records.insert(0, candidate.clone());
                sort_newest_first(records);
                records.truncate(HISTORY_LIMIT);
                if records.iter().all(|r| r.id != candidate.id) {
                    // Older than everything kept; nothing changed.
                    return Mutation::Skip(None);
                }
                Mutation::Persist(Some(candidate))
            })
            .await?;

        match &stored {
            Some(record) => {
                tracing::debug!("Saved check history #{} for {}: {}", record.id, identity, subject)
            }
            None => tracing::debug!("Check not stored (duplicate or too old): {}", subject),
        }

        Ok(stored)
    }

    pub async fn list(&self, identity: Option<&Identity>) -> Result<Vec<CheckRecord>> {
        let Some(identity) = identity else {
            return Ok(Vec::new());
        };

        let records: Vec<CheckRecord> = self
            .store
            .load(Collection::CheckHistory, &ScopeKey::User(identity.clone()))
            .await?;

        Ok(dedup_by_subject(records))
    }

    pub async fn find(&self, identity: Option<&Identity>, id: i64) -> Result<Option<CheckRecord>> {
        let records = self.list(identity).await?;
        Ok(records.into_iter().find(|r| r.id == id))
    }

    pub async fn clear(&self, identity: Option<&Identity>) -> Result<()> {
        let Some(identity) = identity else {
            return Ok(());
        };

        self.store
            .reset(Collection::CheckHistory, &ScopeKey::User(identity.clone()))
            .await?;
        tracing::info!("Cleared check history for {}", identity);
        Ok(())
    }
}

fn is_duplicate(existing: &CheckRecord, candidate: &CheckRecord) -> bool {
    existing.kind == candidate.kind
        && existing.subject_identifier == candidate.subject_identifier
        && (candidate.checked_at - existing.checked_at).num_seconds().abs() < DUPLICATE_WINDOW_SECS
}

// Stable, so equal timestamps keep their current order.
pub fn sort_newest_first(records: &mut [CheckRecord]) {
    records.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
}

/// First record per subject wins.
pub fn dedup_by_subject(records: Vec<CheckRecord>) -> Vec<CheckRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.dedup_key()))
        .collect()
}
