//! Access Key Sweeper Library
//!
//! Scans every account in an identity provider, evaluates each access key
//! against an age policy and an inactivity policy, and disables keys that
//! violate either one.
//!
//! ## Example Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use access_key_sweeper::{AwsIamClient, SweepConfig, Sweeper};
//!
//! let provider = Arc::new(AwsIamClient::from_env()?);
//! let report = Sweeper::new(provider).run(&SweepConfig::from_env()).await?;
//!
//! println!("{}", report.display());
//! ```

pub mod action;
pub mod config;
pub mod error;
pub mod policy;
pub mod provider;
pub mod report;
pub mod sweep;

pub use config::SweepConfig;
pub use error::{ProviderError, SweepError};
pub use policy::{evaluate, KeyFacts, Policy, PolicyKind, Verdict};
pub use provider::{AccessKey, Account, AwsIamClient, IdentityProvider, KeyStatus, MemoryProvider};
pub use report::{Outcome, OutcomeCounts, OutcomeKind, RunReport};
pub use sweep::Sweeper;
