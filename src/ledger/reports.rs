//! Identifiers of content that has already been reported. A record maps to
//! several candidate identifiers; a match on any of them counts.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::db::{Mutation, ScopedStore};
use crate::error::Result;
use crate::models::{CheckKind, CheckRecord, Collection, Identity, LedgerScope, ScopeKey};

pub fn candidate_identifiers(record: &CheckRecord) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    let fallback = format!("unknown_{}", record.id);

    match record.kind {
        CheckKind::Url => {
            if !record.subject_identifier.is_empty() {
                ids.insert(record.subject_identifier.clone());
            }
            ids.insert(fallback);
        }
        CheckKind::Image => {
            if !record.subject_identifier.is_empty() {
                ids.insert(record.subject_identifier.clone());
            }
            if let Some(path) = record.saved_image_path.as_deref().filter(|p| !p.is_empty()) {
                ids.insert(path.to_string());
            }
            ids.insert(fallback);
        }
        CheckKind::Other => {
            ids.insert(format!("general_{}", record.id));
        }
    }

    ids
}

#[derive(Clone)]
pub struct ReportStateTracker {
    store: Arc<ScopedStore>,
    scope: LedgerScope,
}

impl ReportStateTracker {
    pub fn new(store: Arc<ScopedStore>, scope: LedgerScope) -> Self {
        Self { store, scope }
    }

    fn partition(&self, identity: Option<&Identity>) -> Option<ScopeKey> {
        self.scope.resolve(identity)
    }

    /// Whether reports can be tracked for this caller at all.
    pub fn accepts(&self, identity: Option<&Identity>) -> bool {
        self.partition(identity).is_some()
    }

    pub async fn tracked(&self, identity: Option<&Identity>) -> Result<BTreeSet<String>> {
        let Some(scope) = self.partition(identity) else {
            return Ok(BTreeSet::new());
        };
        self.store.load(Collection::ReportedItems, &scope).await
    }

    pub async fn is_reported(&self, identity: Option<&Identity>, record: &CheckRecord) -> Result<bool> {
        let tracked = self.tracked(identity).await?;
        Ok(matches_tracked(&tracked, record))
    }

    pub async fn eligible(&self, identity: Option<&Identity>, record: &CheckRecord) -> Result<bool> {
        if !record.is_low_score() {
            return Ok(false);
        }
        Ok(!self.is_reported(identity, record).await?)
    }

    /// Returns `true` only if the record was not reported before.
    pub async fn mark_reported(&self, identity: Option<&Identity>, record: &CheckRecord) -> Result<bool> {
        let Some(scope) = self.partition(identity) else {
            return Ok(false);
        };
        let candidates = candidate_identifiers(record);
        let record_id = record.id;

        let newly_reported = self
            .store
            .modify(Collection::ReportedItems, &scope, move |tracked: &mut BTreeSet<String>| {
                let already = candidates.iter().any(|id| tracked.contains(id));
                let before = tracked.len();
                tracked.extend(candidates);
                if tracked.len() == before {
                    Mutation::Skip(!already)
                } else {
                    Mutation::Persist(!already)
                }
            })
            .await?;

        if newly_reported {
            tracing::info!("Marked record {} as reported", record_id);
        } else {
            tracing::debug!("Record {} was already reported", record_id);
        }
        Ok(newly_reported)
    }

    pub async fn clear(&self, identity: Option<&Identity>) -> Result<()> {
        if let Some(scope) = self.partition(identity) {
            self.store.reset(Collection::ReportedItems, &scope).await?;
        }
        Ok(())
    }

    pub async fn reportable(
        &self,
        identity: Option<&Identity>,
        records: Vec<CheckRecord>,
    ) -> Result<Vec<CheckRecord>> {
        let tracked = self.tracked(identity).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.is_low_score() && !matches_tracked(&tracked, r))
            .collect())
    }
}

fn matches_tracked(tracked: &BTreeSet<String>, record: &CheckRecord) -> bool {
    candidate_identifiers(record)
        .iter()
        .any(|id| tracked.contains(id))
}
