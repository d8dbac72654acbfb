//! Key Expiration Policies
//!
//! A policy is data: a kind (which timestamp it compares against), an
//! enable toggle and a threshold in days. [`evaluate`] is a pure function
//! of the key facts, the policy and the evaluation instant.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::AccessKey;

/// Default threshold for both policies
pub const DEFAULT_THRESHOLD_DAYS: u32 = 30;

/// Which timestamp a policy compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Flags keys by creation time, regardless of usage
    Age,
    /// Flags keys by last-used time; never-used keys are exempt
    Inactivity,
}

impl PolicyKind {
    /// Evaluation order within a sweep
    pub const ORDERED: [PolicyKind; 2] = [PolicyKind::Age, PolicyKind::Inactivity];

    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Age => "age",
            PolicyKind::Inactivity => "inactivity",
        }
    }

    /// The timestamp this policy measures elapsed time from
    pub fn reference_time(&self, facts: &KeyFacts) -> Option<DateTime<Utc>> {
        match self {
            PolicyKind::Age => Some(facts.created_at),
            PolicyKind::Inactivity => facts.last_used,
        }
    }

    /// Whether evaluating this policy requires the last-used lookup
    pub fn needs_last_used(&self) -> bool {
        matches!(self, PolicyKind::Inactivity)
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A configured policy instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub kind: PolicyKind,
    pub enabled: bool,
    pub threshold_days: u32,
}

impl Policy {
    pub fn new(kind: PolicyKind, enabled: bool, threshold_days: u32) -> Self {
        Self {
            kind,
            enabled,
            threshold_days,
        }
    }

    /// Enabled age policy
    pub fn age(threshold_days: u32) -> Self {
        Self::new(PolicyKind::Age, true, threshold_days)
    }

    /// Enabled inactivity policy
    pub fn inactivity(threshold_days: u32) -> Self {
        Self::new(PolicyKind::Inactivity, true, threshold_days)
    }

    /// Disabled policy with the default threshold
    pub fn disabled(kind: PolicyKind) -> Self {
        Self::new(kind, false, DEFAULT_THRESHOLD_DAYS)
    }

    pub fn threshold(&self) -> Duration {
        Duration::days(i64::from(self.threshold_days))
    }
}

/// The timestamps a verdict is computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFacts {
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl KeyFacts {
    pub fn new(created_at: DateTime<Utc>, last_used: Option<DateTime<Utc>>) -> Self {
        Self {
            created_at,
            last_used,
        }
    }
}

impl From<&AccessKey> for KeyFacts {
    fn from(key: &AccessKey) -> Self {
        Self::new(key.created_at, None)
    }
}

/// Result of evaluating one key against one policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub flagged: bool,
    pub reason: PolicyKind,
    pub threshold_days: u32,
}

/// Decide whether `policy` flags a key.
///
/// A key is flagged when its reference time exists and strictly more than
/// `threshold_days` days have elapsed since it at `now`.
pub fn evaluate(facts: &KeyFacts, policy: &Policy, now: DateTime<Utc>) -> Verdict {
    let flagged = policy
        .kind
        .reference_time(facts)
        .map(|at| now.signed_duration_since(at) > policy.threshold())
        .unwrap_or(false);

    Verdict {
        flagged,
        reason: policy.kind,
        threshold_days: policy.threshold_days,
    }
}
