use std::fmt;

use serde::{Deserialize, Serialize};

/// The logged-in user's email, used as the partition key for per-user collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Returns `None` for blank input; an unauthenticated caller has no identity.
    pub fn parse(email: &str) -> Option<Self> {
        let trimmed = email.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Second half of a store address: either the shared partition or one user's.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Global,
    User(Identity),
}

impl ScopeKey {
    pub fn as_str(&self) -> &str {
        match self {
            ScopeKey::Global => "",
            ScopeKey::User(identity) => identity.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    CheckHistory,
    PointHistory,
    ReportedItems,
    PendingReports,
    UserPrefs,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::CheckHistory => "veriscope_history",
            Collection::PointHistory => "veriscope_rewards",
            Collection::ReportedItems => "veriscope_reported",
            Collection::PendingReports => "veriscope_pending_reports",
            Collection::UserPrefs => "user_prefs",
        }
    }

    /// Payload returned when nothing has been written yet.
    pub fn empty_payload(self) -> &'static str {
        match self {
            Collection::UserPrefs => "{}",
            _ => "[]",
        }
    }
}

/// How the point ledger and report set are partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerScope {
    /// One shared partition for every identity on the device.
    #[default]
    Global,
    /// Partitioned by identity, like check history.
    Identity,
}

impl LedgerScope {
    /// Resolves the partition for a shared ledger. Fails closed under
    /// identity scoping when nobody is logged in.
    pub fn resolve(self, identity: Option<&Identity>) -> Option<ScopeKey> {
        match self {
            LedgerScope::Global => Some(ScopeKey::Global),
            LedgerScope::Identity => identity.cloned().map(ScopeKey::User),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_email_has_no_identity() {
        assert!(Identity::parse("").is_none());
        assert!(Identity::parse("   ").is_none());
        assert_eq!(
            Identity::parse(" a@b.c ").map(|i| i.to_string()),
            Some("a@b.c".to_string())
        );
    }

    #[test]
    fn identity_scope_fails_closed_without_user() {
        assert_eq!(LedgerScope::Identity.resolve(None), None);
        assert_eq!(LedgerScope::Global.resolve(None), Some(ScopeKey::Global));

        let user = Identity::parse("a@b.c");
        assert_eq!(
            LedgerScope::Identity.resolve(user.as_ref()),
            user.clone().map(ScopeKey::User)
        );
    }
}
