//! Sweep Orchestrator
//!
//! One sweep lists every account, lists each account's keys and runs the
//! enabled policies over every key in order (age, then inactivity). The
//! first policy that flags a key decides its fate; later policies are not
//! evaluated for it, so a key gets at most one disablement per sweep.
//!
//! ## Failure handling
//!
//! - Listing accounts fails: the sweep aborts with [`SweepError`]
//! - Listing one account's keys fails: one error outcome for that account
//! - Fetching one key's last-used time fails: one error outcome for that key
//! - Updating one key fails: one error outcome for that key
//!
//! ## Concurrency
//!
//! Accounts are processed up to `concurrency` at a time through an ordered
//! buffer, so the report stays in account order. Keys of one account are
//! always processed one after another.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::action;
use crate::config::SweepConfig;
use crate::error::SweepError;
use crate::policy::{evaluate, KeyFacts, Policy};
use crate::provider::{AccessKey, Account, IdentityProvider};
use crate::report::{AccountSweep, ErrorStage, Outcome, RunReport};

/// Drives sweeps against one identity provider
pub struct Sweeper {
    provider: Arc<dyn IdentityProvider>,
}

impl Sweeper {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Run a sweep evaluated at the current time
    pub async fn run(&self, config: &SweepConfig) -> Result<RunReport, SweepError> {
        self.run_at(config, Utc::now()).await
    }

    /// Run a sweep with every policy evaluated at `now`
    pub async fn run_at(
        &self,
        config: &SweepConfig,
        now: DateTime<Utc>,
    ) -> Result<RunReport, SweepError> {
        let run_id = Uuid::new_v4();
        let policies = config.enabled_policies();

        info!(
            run_id = %run_id,
            dry_run = config.dry_run,
            age_enabled = config.age.enabled,
            age_days = config.age.threshold_days,
            inactivity_enabled = config.inactivity.enabled,
            inactivity_days = config.inactivity.threshold_days,
            concurrency = config.concurrency,
            "Starting access key sweep"
        );
        for policy in config.policies().iter().filter(|p| !p.enabled) {
            info!(policy = %policy.kind, "Disabling keys by {} is not enabled", policy.kind);
        }

        let accounts = self.provider.list_accounts().await.map_err(|e| {
            error!(run_id = %run_id, error = %e, "Failed to list accounts, aborting sweep");
            SweepError::AccountEnumeration(e)
        })?;

        info!(run_id = %run_id, accounts = accounts.len(), "Listed accounts");

        let mut report = RunReport::new(run_id, config.dry_run, now);
        let mut sweeps = stream::iter(accounts.iter())
            .map(|account| self.sweep_account(account, &policies, config.dry_run, now))
            .buffered(config.concurrency.max(1));

        while let Some(account_sweep) = sweeps.next().await {
            report.record_account(account_sweep);
        }

        let report = report.finish(Utc::now());
        report.log_summary();
        Ok(report)
    }

    async fn sweep_account(
        &self,
        account: &Account,
        policies: &[Policy],
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> AccountSweep {
        debug!(user = %account.user_name, "Checking credentials for user");

        let keys = match self.provider.list_access_keys(account).await {
            Ok(keys) => keys,
            Err(e) => {
                return AccountSweep {
                    keys_scanned: 0,
                    outcomes: vec![Outcome::account_error(account, &e)],
                }
            }
        };

        let mut outcomes = Vec::with_capacity(keys.len());
        for key in &keys {
            outcomes.push(self.sweep_key(account, key, policies, dry_run, now).await);
        }

        AccountSweep {
            keys_scanned: keys.len(),
            outcomes,
        }
    }

    async fn sweep_key(
        &self,
        account: &Account,
        key: &AccessKey,
        policies: &[Policy],
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Outcome {
        let mut facts = KeyFacts::from(key);
        let mut last_used_fetched = false;

        for policy in policies {
            if policy.kind.needs_last_used() && !last_used_fetched {
                match self.provider.last_used(&key.key_id).await {
                    Ok(at) => facts.last_used = at,
                    Err(e) => return Outcome::key_error(account, key, ErrorStage::LastUsed, &e),
                }
                last_used_fetched = true;
            }

            let verdict = evaluate(&facts, policy, now);
            if verdict.flagged {
                return action::disable(self.provider.as_ref(), account, key, &verdict, dry_run)
                    .await;
            }
        }

        debug!(user = %account.user_name, key_id = %key.key_id, "Access key within policy");
        Outcome::left_alone(account, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyKind;
    use crate::provider::{KeyStatus, MemoryProvider};
    use crate::report::OutcomeKind;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - Duration::days(days)
    }

    #[tokio::test]
    async fn test_disabled_inactivity_policy_skips_last_used_lookup() {
        let provider = Arc::new(
            MemoryProvider::new()
                .with_key("alice", "AKIA1", days_ago(5), KeyStatus::Active)
                .with_last_used("AKIA1", days_ago(100)),
        );
        let sweeper = Sweeper::new(provider.clone());

        let report = sweeper
            .run_at(&SweepConfig::default().with_age_policy(30), now())
            .await
            .unwrap();

        assert_eq!(report.counts().left_alone, 1);
        assert!(provider.last_used_lookups().is_empty());
    }

    #[tokio::test]
    async fn test_age_flag_short_circuits_inactivity() {
        let provider = Arc::new(
            MemoryProvider::new()
                .with_key("alice", "AKIA1", days_ago(90), KeyStatus::Active)
                .with_last_used("AKIA1", days_ago(60)),
        );
        let sweeper = Sweeper::new(provider.clone());
        let config = SweepConfig::default()
            .with_age_policy(30)
            .with_inactivity_policy(30);

        let report = sweeper.run_at(&config, now()).await.unwrap();

        assert_eq!(report.outcomes().len(), 1);
        assert_eq!(report.outcomes()[0].reason, Some(PolicyKind::Age));
        assert!(provider.last_used_lookups().is_empty());
        assert_eq!(provider.status_changes().len(), 1);
    }

    #[tokio::test]
    async fn test_no_enabled_policies_leaves_everything_alone() {
        let provider = Arc::new(
            MemoryProvider::new().with_key("alice", "AKIA1", days_ago(900), KeyStatus::Active),
        );
        let sweeper = Sweeper::new(provider.clone());

        let report = sweeper.run_at(&SweepConfig::default(), now()).await.unwrap();

        assert_eq!(report.outcomes()[0].kind, OutcomeKind::LeftAlone);
        assert!(provider.status_changes().is_empty());
    }

    #[tokio::test]
    async fn test_last_used_failure_is_isolated_to_key() {
        let provider = Arc::new(
            MemoryProvider::new()
                .with_key("alice", "AKIABAD", days_ago(5), KeyStatus::Active)
                .with_key("alice", "AKIAOLD", days_ago(5), KeyStatus::Active)
                .with_last_used("AKIAOLD", days_ago(45))
                .fail_last_used_for("AKIABAD"),
        );
        let sweeper = Sweeper::new(provider.clone());

        let report = sweeper
            .run_at(&SweepConfig::default().with_inactivity_policy(30), now())
            .await
            .unwrap();

        let outcomes = report.outcomes();
        assert_eq!(outcomes[0].kind, OutcomeKind::Error);
        assert_eq!(outcomes[0].stage, Some(ErrorStage::LastUsed));
        assert_eq!(outcomes[1].kind, OutcomeKind::Disabled);
        assert_eq!(outcomes[1].reason, Some(PolicyKind::Inactivity));
    }
}
