//! Run Report
//!
//! Outcomes are recorded in arrival order: account-major, then key order
//! within the account. Each notable outcome (disablement, dry-run flag,
//! error) is logged as it is recorded; [`RunReport::log_summary`] emits the
//! closing line.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ProviderError;
use crate::policy::{PolicyKind, Verdict};
use crate::provider::{AccessKey, Account, KeyStatus};

/// What happened to one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Disabled,
    DryRunFlagged,
    LeftAlone,
    Error,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            OutcomeKind::Disabled => "disabled",
            OutcomeKind::DryRunFlagged => "dry-run-flagged",
            OutcomeKind::LeftAlone => "left-alone",
            OutcomeKind::Error => "error",
        })
    }
}

/// The provider call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorStage {
    /// Listing an account's keys
    ListAccessKeys,
    /// Fetching a key's last-used time
    LastUsed,
    /// The status update itself
    SetStatus,
}

impl std::fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorStage::ListAccessKeys => write!(f, "list-access-keys"),
            ErrorStage::LastUsed => write!(f, "last-used"),
            ErrorStage::SetStatus => write!(f, "set-status"),
        }
    }
}

/// One record in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub user_name: String,
    /// `None` for account-level failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    pub kind: OutcomeKind,
    /// Policy that flagged the key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<PolicyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_days: Option<u32>,
    /// Key status as listed at the start of processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<KeyStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<ErrorStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    fn for_key(account: &Account, key: &AccessKey, kind: OutcomeKind) -> Self {
        Self {
            user_name: account.user_name.clone(),
            key_id: Some(key.key_id.clone()),
            kind,
            reason: None,
            threshold_days: None,
            previous_status: Some(key.status),
            stage: None,
            error: None,
        }
    }

    fn with_verdict(mut self, verdict: &Verdict) -> Self {
        self.reason = Some(verdict.reason);
        self.threshold_days = Some(verdict.threshold_days);
        self
    }

    pub fn disabled(account: &Account, key: &AccessKey, verdict: &Verdict) -> Self {
        Self::for_key(account, key, OutcomeKind::Disabled).with_verdict(verdict)
    }

    pub fn dry_run_flagged(account: &Account, key: &AccessKey, verdict: &Verdict) -> Self {
        Self::for_key(account, key, OutcomeKind::DryRunFlagged).with_verdict(verdict)
    }

    pub fn left_alone(account: &Account, key: &AccessKey) -> Self {
        Self::for_key(account, key, OutcomeKind::LeftAlone)
    }

    /// A failure while handling a single key
    pub fn key_error(
        account: &Account,
        key: &AccessKey,
        stage: ErrorStage,
        err: &ProviderError,
    ) -> Self {
        let mut outcome = Self::for_key(account, key, OutcomeKind::Error);
        outcome.stage = Some(stage);
        outcome.error = Some(err.to_string());
        outcome
    }

    /// A failure that prevented any of the account's keys from being read
    pub fn account_error(account: &Account, err: &ProviderError) -> Self {
        Self {
            user_name: account.user_name.clone(),
            key_id: None,
            kind: OutcomeKind::Error,
            reason: None,
            threshold_days: None,
            previous_status: None,
            stage: Some(ErrorStage::ListAccessKeys),
            error: Some(err.to_string()),
        }
    }

    /// Attach the verdict that led to a failed action
    pub(crate) fn caused_by(self, verdict: &Verdict) -> Self {
        self.with_verdict(verdict)
    }

    fn log(&self) {
        let key_id = self.key_id.as_deref().unwrap_or("-");
        let reason = self.reason.map(|r| r.name()).unwrap_or("-");

        match self.kind {
            OutcomeKind::Disabled => info!(
                user = %self.user_name,
                key_id = %key_id,
                reason = %reason,
                threshold_days = self.threshold_days.unwrap_or_default(),
                "Disabled access key {} for user {}",
                key_id,
                self.user_name
            ),
            OutcomeKind::DryRunFlagged => info!(
                user = %self.user_name,
                key_id = %key_id,
                reason = %reason,
                threshold_days = self.threshold_days.unwrap_or_default(),
                "DRY RUN - would disable access key {} for user {}",
                key_id,
                self.user_name
            ),
            OutcomeKind::Error if self.key_id.is_none() => error!(
                user = %self.user_name,
                error = self.error.as_deref().unwrap_or_default(),
                "Failed to list access keys, skipping user"
            ),
            OutcomeKind::Error => warn!(
                user = %self.user_name,
                key_id = %key_id,
                stage = %self.stage.map(|s| s.to_string()).unwrap_or_default(),
                error = self.error.as_deref().unwrap_or_default(),
                "Access key could not be processed"
            ),
            OutcomeKind::LeftAlone => {}
        }
    }
}

/// Per-kind totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub disabled: usize,
    pub dry_run_flagged: usize,
    pub left_alone: usize,
    pub errors: usize,
}

impl OutcomeCounts {
    fn add(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Disabled => self.disabled += 1,
            OutcomeKind::DryRunFlagged => self.dry_run_flagged += 1,
            OutcomeKind::LeftAlone => self.left_alone += 1,
            OutcomeKind::Error => self.errors += 1,
        }
    }

    /// Keys a live sweep would disable (or did)
    pub fn flagged(&self) -> usize {
        self.disabled + self.dry_run_flagged
    }
}

/// Everything one account contributed to a sweep
#[derive(Debug, Clone, Default)]
pub struct AccountSweep {
    pub keys_scanned: usize,
    pub outcomes: Vec<Outcome>,
}

/// Aggregate over one sweep
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    run_id: Uuid,
    dry_run: bool,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    users_scanned: usize,
    keys_scanned: usize,
    counts: OutcomeCounts,
    outcomes: Vec<Outcome>,
}

impl RunReport {
    pub(crate) fn new(run_id: Uuid, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            dry_run,
            started_at,
            finished_at: None,
            users_scanned: 0,
            keys_scanned: 0,
            counts: OutcomeCounts::default(),
            outcomes: Vec::new(),
        }
    }

    /// Append one outcome, logging it if notable
    pub(crate) fn record(&mut self, outcome: Outcome) {
        outcome.log();
        self.counts.add(outcome.kind);
        self.outcomes.push(outcome);
    }

    /// Append everything one account produced
    pub(crate) fn record_account(&mut self, sweep: AccountSweep) {
        self.users_scanned += 1;
        self.keys_scanned += sweep.keys_scanned;
        for outcome in sweep.outcomes {
            self.record(outcome);
        }
    }

    pub(crate) fn finish(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    pub fn users_scanned(&self) -> usize {
        self.users_scanned
    }

    pub fn keys_scanned(&self) -> usize {
        self.keys_scanned
    }

    pub fn counts(&self) -> &OutcomeCounts {
        &self.counts
    }

    /// Outcomes in arrival order
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Outcomes of one kind, in arrival order
    pub fn outcomes_of(&self, kind: OutcomeKind) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(move |o| o.kind == kind)
    }

    pub fn has_errors(&self) -> bool {
        self.counts.errors > 0
    }

    pub fn log_summary(&self) {
        info!(
            run_id = %self.run_id,
            dry_run = self.dry_run,
            users = self.users_scanned,
            keys = self.keys_scanned,
            disabled = self.counts.disabled,
            dry_run_flagged = self.counts.dry_run_flagged,
            left_alone = self.counts.left_alone,
            errors = self.counts.errors,
            duration_ms = self.duration().map(|d| d.num_milliseconds()).unwrap_or_default(),
            "Access key sweep complete"
        );
    }

    /// Format the report for display
    pub fn display(&self) -> String {
        let mut out = format!(
            "Access Key Sweep {}{}:\n  Users scanned: {}\n  Keys scanned: {}\n  Disabled: {}\n  Dry-run flagged: {}\n  Left alone: {}\n  Errors: {}",
            self.run_id,
            if self.dry_run { " (dry run)" } else { "" },
            self.users_scanned,
            self.keys_scanned,
            self.counts.disabled,
            self.counts.dry_run_flagged,
            self.counts.left_alone,
            self.counts.errors,
        );

        for outcome in self.outcomes.iter().filter(|o| o.kind != OutcomeKind::LeftAlone) {
            out.push_str(&format!(
                "\n  {:<16} {:<24} {:<22} {}",
                outcome.kind,
                outcome.user_name,
                outcome.key_id.as_deref().unwrap_or("-"),
                outcome
                    .reason
                    .map(|r| r.to_string())
                    .or_else(|| outcome.error.clone())
                    .unwrap_or_default()
            ));
        }

        out
    }
}
