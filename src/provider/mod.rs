//! Identity Provider Contract
//!
//! The sweep reads accounts and access keys from, and writes key status to,
//! an identity provider through the [`IdentityProvider`] trait.
//!
//! ## Implementations
//!
//! - [`AwsIamClient`]: AWS IAM Query API (SigV4-signed, paginated)
//! - [`MemoryProvider`]: in-process fake with failure injection

pub mod aws;
pub mod memory;
mod sigv4;

pub use aws::{AwsCredentials, AwsIamClient, AwsIamConfig};
pub use memory::{MemoryProvider, StatusChange};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A named identity that may hold access keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub user_name: String,
}

impl Account {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
        }
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_name)
    }
}

/// Status of an access key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyStatus {
    Active,
    Inactive,
}

impl KeyStatus {
    /// Wire value used by the IAM API
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "Active",
            KeyStatus::Inactive => "Inactive",
        }
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KeyStatus {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(KeyStatus::Active),
            "Inactive" => Ok(KeyStatus::Inactive),
            other => Err(ProviderError::InvalidResponse(format!(
                "Unknown access key status: {}",
                other
            ))),
        }
    }
}

/// Access key metadata as listed for an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub key_id: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
    pub status: KeyStatus,
}

/// Operations the sweep needs from an identity provider.
///
/// Every call may fail independently; the sweep decides which failures
/// are fatal.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// List every account in the tenant
    async fn list_accounts(&self) -> Result<Vec<Account>, ProviderError>;

    /// List the access keys belonging to `account`
    async fn list_access_keys(&self, account: &Account) -> Result<Vec<AccessKey>, ProviderError>;

    /// When the key was last used, or `None` if it never was
    async fn last_used(&self, key_id: &str) -> Result<Option<DateTime<Utc>>, ProviderError>;

    /// Set the status of a key. Setting a key to its current status succeeds.
    async fn set_status(
        &self,
        key_id: &str,
        account: &Account,
        status: KeyStatus,
    ) -> Result<(), ProviderError>;
}
