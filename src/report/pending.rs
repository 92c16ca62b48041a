use std::sync::Arc;

use crate::db::{Mutation, ScopedStore};
use crate::error::{AppError, Result};
use crate::models::{Collection, Identity, ScopeKey};

use super::flow::{ReportFlow, ReportState};

/// Reports handed off but not yet confirmed, kept per user so a deferred
/// confirmation survives restarts.
#[derive(Clone)]
pub struct PendingReports {
    store: Arc<ScopedStore>,
}

impl PendingReports {
    pub fn new(store: Arc<ScopedStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, identity: Option<&Identity>) -> Result<Vec<ReportFlow>> {
        let Some(identity) = identity else {
            return Ok(Vec::new());
        };
        self.store
            .load(Collection::PendingReports, &ScopeKey::User(identity.clone()))
            .await
    }

    pub async fn get(&self, identity: Option<&Identity>, record_id: i64) -> Result<Option<ReportFlow>> {
        let flows = self.list(identity).await?;
        Ok(flows.into_iter().find(|f| f.record_id() == record_id))
    }

    /// Stores `flow`, replacing any earlier entry for the same record.
    /// Confirmed flows are dropped instead.
    pub async fn save(&self, identity: Option<&Identity>, flow: ReportFlow) -> Result<()> {
        let identity = identity.ok_or(AppError::MissingIdentity)?;
        let record_id = flow.record_id();

        self.store
            .modify(
                Collection::PendingReports,
                &ScopeKey::User(identity.clone()),
                move |flows: &mut Vec<ReportFlow>| {
                    flows.retain(|f| f.record_id() != record_id);
                    if flow.state() != ReportState::Confirmed {
                        flows.push(flow);
                    }
                    Mutation::Persist(())
                },
            )
            .await
    }

    pub async fn remove(&self, identity: Option<&Identity>, record_id: i64) -> Result<()> {
        let Some(identity) = identity else {
            return Ok(());
        };

        self.store
            .modify(
                Collection::PendingReports,
                &ScopeKey::User(identity.clone()),
                move |flows: &mut Vec<ReportFlow>| {
                    let before = flows.len();
                    flows.retain(|f| f.record_id() != record_id);
                    if flows.len() == before {
                        Mutation::Skip(())
                    } else {
                        Mutation::Persist(())
                    }
                },
            )
            .await
    }
}
