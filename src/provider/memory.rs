//! In-memory identity provider
//!
//! Holds accounts and keys in process, records every status update it
//! receives, and can be told to fail specific calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AccessKey, Account, IdentityProvider, KeyStatus};
use crate::error::ProviderError;

/// A status update received by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub key_id: String,
    pub user_name: String,
    pub status: KeyStatus,
}

#[derive(Debug, Default)]
struct State {
    accounts: Vec<Account>,
    keys: HashMap<String, Vec<AccessKey>>,
    last_used: HashMap<String, DateTime<Utc>>,
    fail_account_listing: bool,
    failing_key_listings: HashSet<String>,
    failing_last_used: HashSet<String>,
    failing_updates: HashSet<String>,
    status_changes: Vec<StatusChange>,
    last_used_lookups: Vec<String>,
}

/// Identity provider backed by process memory
#[derive(Debug, Default)]
pub struct MemoryProvider {
    state: Mutex<State>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_state(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.state());
        self
    }

    /// Add an account with no keys
    pub fn with_account(self, user_name: &str) -> Self {
        self.with_state(|s| {
            if !s.accounts.iter().any(|a| a.user_name == user_name) {
                s.accounts.push(Account::new(user_name));
            }
        })
    }

    /// Add a key, creating its account if needed
    pub fn with_key(
        self,
        user_name: &str,
        key_id: &str,
        created_at: DateTime<Utc>,
        status: KeyStatus,
    ) -> Self {
        self.with_account(user_name).with_state(|s| {
            s.keys
                .entry(user_name.to_string())
                .or_default()
                .push(AccessKey {
                    key_id: key_id.to_string(),
                    user_name: user_name.to_string(),
                    created_at,
                    status,
                });
        })
    }

    /// Record a last-used time for a key
    pub fn with_last_used(self, key_id: &str, at: DateTime<Utc>) -> Self {
        self.with_state(|s| {
            s.last_used.insert(key_id.to_string(), at);
        })
    }

    /// Make `list_accounts` fail
    pub fn fail_account_listing(self) -> Self {
        self.with_state(|s| s.fail_account_listing = true)
    }

    /// Make `list_access_keys` fail for one user
    pub fn fail_key_listing_for(self, user_name: &str) -> Self {
        self.with_state(|s| {
            s.failing_key_listings.insert(user_name.to_string());
        })
    }

    /// Make `last_used` fail for one key
    pub fn fail_last_used_for(self, key_id: &str) -> Self {
        self.with_state(|s| {
            s.failing_last_used.insert(key_id.to_string());
        })
    }

    /// Make `set_status` fail for one key
    pub fn fail_updates_for(self, key_id: &str) -> Self {
        self.with_state(|s| {
            s.failing_updates.insert(key_id.to_string());
        })
    }

    /// Every status update received, in order, including rejected ones
    pub fn status_changes(&self) -> Vec<StatusChange> {
        self.state().status_changes.clone()
    }

    /// Key ids whose last-used time was requested, in order
    pub fn last_used_lookups(&self) -> Vec<String> {
        self.state().last_used_lookups.clone()
    }

    /// Current status of a key
    pub fn status_of(&self, key_id: &str) -> Option<KeyStatus> {
        self.state()
            .keys
            .values()
            .flatten()
            .find(|k| k.key_id == key_id)
            .map(|k| k.status)
    }
}

#[async_trait]
impl IdentityProvider for MemoryProvider {
    async fn list_accounts(&self) -> Result<Vec<Account>, ProviderError> {
        let state = self.state();
        if state.fail_account_listing {
            return Err(ProviderError::api(503, "ServiceUnavailable", "ListUsers is unavailable"));
        }
        Ok(state.accounts.clone())
    }

    async fn list_access_keys(&self, account: &Account) -> Result<Vec<AccessKey>, ProviderError> {
        let state = self.state();
        if state.failing_key_listings.contains(&account.user_name) {
            return Err(ProviderError::api(
                500,
                "ServiceFailure",
                format!("ListAccessKeys failed for {}", account.user_name),
            ));
        }
        Ok(state.keys.get(&account.user_name).cloned().unwrap_or_default())
    }

    async fn last_used(&self, key_id: &str) -> Result<Option<DateTime<Utc>>, ProviderError> {
        let mut state = self.state();
        state.last_used_lookups.push(key_id.to_string());
        if state.failing_last_used.contains(key_id) {
            return Err(ProviderError::api(
                500,
                "ServiceFailure",
                format!("GetAccessKeyLastUsed failed for {}", key_id),
            ));
        }
        Ok(state.last_used.get(key_id).copied())
    }

    async fn set_status(
        &self,
        key_id: &str,
        account: &Account,
        status: KeyStatus,
    ) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.status_changes.push(StatusChange {
            key_id: key_id.to_string(),
            user_name: account.user_name.clone(),
            status,
        });
        if state.failing_updates.contains(key_id) {
            return Err(ProviderError::api(
                500,
                "ServiceFailure",
                format!("UpdateAccessKey failed for {}", key_id),
            ));
        }

        let key = state
            .keys
            .get_mut(&account.user_name)
            .and_then(|keys| keys.iter_mut().find(|k| k.key_id == key_id))
            .ok_or_else(|| {
                ProviderError::api(
                    404,
                    "NoSuchEntity",
                    format!("The Access Key with id {} cannot be found.", key_id),
                )
            })?;
        key.status = status;
        Ok(())
    }
}
