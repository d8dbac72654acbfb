//! Sweep Configuration
//!
//! Resolved once from the process environment before a sweep starts.
//! Malformed values never fail the run: they fall back to defaults with a
//! warning.

use serde::Serialize;
use tracing::warn;

use crate::policy::{Policy, PolicyKind, DEFAULT_THRESHOLD_DAYS};

pub const DRY_RUN_MODE_ENV: &str = "DRY_RUN_MODE";
pub const DISABLE_KEYS_TOGGLE_ENV: &str = "DISABLE_KEYS_TOGGLE";
pub const DISABLE_KEYS_DAYS_ENV: &str = "DISABLE_KEYS_DAYS";
pub const DISABLE_UNUSED_KEYS_TOGGLE_ENV: &str = "DISABLE_UNUSED_ONLY_KEYS_TOGGLE";
pub const DISABLE_UNUSED_KEYS_DAYS_ENV: &str = "DISABLE_UNUSED_ONLY_KEYS_DAYS";
pub const SWEEP_CONCURRENCY_ENV: &str = "SWEEP_CONCURRENCY";

const DEFAULT_CONCURRENCY: usize = 1;

/// Immutable settings for one sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepConfig {
    /// Report decisions without changing any key
    pub dry_run: bool,
    /// Policy keyed on creation time
    pub age: Policy,
    /// Policy keyed on last-used time
    pub inactivity: Policy,
    /// Number of accounts processed at once
    pub concurrency: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            age: Policy::disabled(PolicyKind::Age),
            inactivity: Policy::disabled(PolicyKind::Inactivity),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl SweepConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let age = Policy::new(
            PolicyKind::Age,
            lookup_bool(&lookup, DISABLE_KEYS_TOGGLE_ENV, false),
            lookup_days(&lookup, DISABLE_KEYS_DAYS_ENV, DEFAULT_THRESHOLD_DAYS),
        );
        let inactivity = Policy::new(
            PolicyKind::Inactivity,
            lookup_bool(&lookup, DISABLE_UNUSED_KEYS_TOGGLE_ENV, false),
            lookup_days(&lookup, DISABLE_UNUSED_KEYS_DAYS_ENV, DEFAULT_THRESHOLD_DAYS),
        );

        Self {
            dry_run: lookup_bool(&lookup, DRY_RUN_MODE_ENV, false),
            age,
            inactivity,
            concurrency: lookup_concurrency(&lookup),
        }
    }

    /// Enable dry-run mode
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable the age policy with the given threshold
    pub fn with_age_policy(mut self, threshold_days: u32) -> Self {
        self.age = Policy::age(threshold_days);
        self
    }

    /// Enable the inactivity policy with the given threshold
    pub fn with_inactivity_policy(mut self, threshold_days: u32) -> Self {
        self.inactivity = Policy::inactivity(threshold_days);
        self
    }

    /// Process up to `concurrency` accounts at once (minimum 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// All policies in evaluation order
    pub fn policies(&self) -> [Policy; 2] {
        [self.age, self.inactivity]
    }

    /// Enabled policies in evaluation order
    pub fn enabled_policies(&self) -> Vec<Policy> {
        self.policies().into_iter().filter(|p| p.enabled).collect()
    }
}

/// Parse a boolean the way `strconv.ParseBool`-style settings are written
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn lookup_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return default;
    }

    parse_bool(raw).unwrap_or_else(|| {
        warn!(setting = %key, value = %raw, default, "Malformed boolean setting, using default");
        default
    })
}

fn lookup_days<F>(lookup: &F, key: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return default;
    }

    raw.parse::<u32>().unwrap_or_else(|_| {
        warn!(setting = %key, value = %raw, default, "Malformed day threshold, using default");
        default
    })
}

fn lookup_concurrency<F>(lookup: &F) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(SWEEP_CONCURRENCY_ENV).map(|v| v.trim().to_string()) {
        None => DEFAULT_CONCURRENCY,
        Some(raw) if raw.is_empty() => DEFAULT_CONCURRENCY,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                warn!(
                    setting = SWEEP_CONCURRENCY_ENV,
                    value = %raw,
                    "Malformed concurrency, using default"
                );
                DEFAULT_CONCURRENCY
            }
        },
    }
}
