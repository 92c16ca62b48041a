use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{Mutation, ScopedStore};
use crate::error::Result;
use crate::models::{Collection, Identity, ScopeKey};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountState {
    pub current: Option<Identity>,
    pub remember_email: bool,
    pub remembered_email: Option<String>,
    pub auto_login: bool,
}

#[derive(Clone)]
pub struct AccountBook {
    store: Arc<ScopedStore>,
}

impl AccountBook {
    pub fn new(store: Arc<ScopedStore>) -> Self {
        Self { store }
    }

    pub async fn state(&self) -> Result<AccountState> {
        self.store.load(Collection::UserPrefs, &ScopeKey::Global).await
    }

    pub async fn current(&self) -> Result<Option<Identity>> {
        Ok(self.state().await?.current)
    }

    pub async fn login(&self, identity: Identity, remember_email: bool) -> Result<()> {
        tracing::info!("Logged in as {}", identity);
        self.store
            .modify(Collection::UserPrefs, &ScopeKey::Global, move |state: &mut AccountState| {
                state.remember_email = remember_email;
                state.remembered_email = remember_email.then(|| identity.to_string());
                state.current = Some(identity);
                Mutation::Persist(())
            })
            .await
    }

    /// Clears the active user but keeps a remembered email for the next login.
    pub async fn logout(&self) -> Result<()> {
        self.store
            .modify(Collection::UserPrefs, &ScopeKey::Global, |state: &mut AccountState| {
                let remembered = state
                    .remember_email
                    .then(|| state.remembered_email.take())
                    .flatten();
                *state = AccountState {
                    remember_email: remembered.is_some(),
                    remembered_email: remembered,
                    ..AccountState::default()
                };
                Mutation::Persist(())
            })
            .await
    }

    pub async fn set_auto_login(&self, enabled: bool) -> Result<()> {
        self.store
            .modify(Collection::UserPrefs, &ScopeKey::Global, move |state: &mut AccountState| {
                state.auto_login = enabled;
                Mutation::Persist(())
            })
            .await
    }
}
