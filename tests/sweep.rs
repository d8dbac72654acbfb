//! End-to-end sweeps against the in-memory provider

use std::sync::Arc;

use access_key_sweeper::provider::StatusChange;
use access_key_sweeper::report::ErrorStage;
use access_key_sweeper::{
    KeyStatus, MemoryProvider, OutcomeKind, PolicyKind, SweepConfig, SweepError, Sweeper,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap()
}

fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

fn both_policies(days: u32) -> SweepConfig {
    SweepConfig::default()
        .with_age_policy(days)
        .with_inactivity_policy(days)
}

/// Three users with a mix of old, stale, fresh and never-used keys
fn fleet() -> MemoryProvider {
    MemoryProvider::new()
        .with_key("alice", "AKIAALICEOLD", days_ago(45), KeyStatus::Active)
        .with_key("alice", "AKIAALICENEW", days_ago(3), KeyStatus::Active)
        .with_last_used("AKIAALICENEW", days_ago(1))
        .with_key("bob", "AKIABOBSTALE", days_ago(20), KeyStatus::Active)
        .with_last_used("AKIABOBSTALE", days_ago(40))
        .with_key("bob", "AKIABOBNEVER", days_ago(25), KeyStatus::Active)
        .with_key("carol", "AKIACAROLOFF", days_ago(400), KeyStatus::Inactive)
}

#[tokio::test]
async fn test_age_policy_disables_old_key() {
    let provider = Arc::new(
        MemoryProvider::new().with_key("alice", "AKIA1", days_ago(45), KeyStatus::Active),
    );
    let sweeper = Sweeper::new(provider.clone());

    let report = sweeper
        .run_at(&SweepConfig::default().with_age_policy(30), now())
        .await
        .unwrap();

    let outcome = &report.outcomes()[0];
    assert_eq!(outcome.kind, OutcomeKind::Disabled);
    assert_eq!(outcome.reason, Some(PolicyKind::Age));
    assert_eq!(outcome.threshold_days, Some(30));
    assert_eq!(
        provider.status_changes(),
        vec![StatusChange {
            key_id: "AKIA1".to_string(),
            user_name: "alice".to_string(),
            status: KeyStatus::Inactive,
        }]
    );
    assert_eq!(provider.status_of("AKIA1"), Some(KeyStatus::Inactive));
}

#[tokio::test]
async fn test_fresh_never_used_key_is_left_alone() {
    let provider = Arc::new(
        MemoryProvider::new().with_key("alice", "AKIA1", days_ago(10), KeyStatus::Active),
    );
    let sweeper = Sweeper::new(provider.clone());

    let report = sweeper.run_at(&both_policies(30), now()).await.unwrap();

    assert_eq!(report.outcomes()[0].kind, OutcomeKind::LeftAlone);
    assert_eq!(report.counts().left_alone, 1);
    assert!(provider.status_changes().is_empty());
}

#[tokio::test]
async fn test_dry_run_flags_inactive_key_without_mutating() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_key("alice", "AKIA1", days_ago(100), KeyStatus::Active)
            .with_last_used("AKIA1", days_ago(35)),
    );
    let sweeper = Sweeper::new(provider.clone());
    let config = SweepConfig::default()
        .with_inactivity_policy(30)
        .dry_run(true);

    let report = sweeper.run_at(&config, now()).await.unwrap();

    let outcome = &report.outcomes()[0];
    assert_eq!(outcome.kind, OutcomeKind::DryRunFlagged);
    assert_eq!(outcome.reason, Some(PolicyKind::Inactivity));
    assert!(report.dry_run());
    assert!(provider.status_changes().is_empty());
    assert_eq!(provider.status_of("AKIA1"), Some(KeyStatus::Active));
}

#[tokio::test]
async fn test_dry_run_count_matches_live_sweep() {
    let dry_provider = Arc::new(fleet());
    let dry = Sweeper::new(dry_provider.clone())
        .run_at(&both_policies(30).dry_run(true), now())
        .await
        .unwrap();

    let live_provider = Arc::new(fleet());
    let live = Sweeper::new(live_provider.clone())
        .run_at(&both_policies(30), now())
        .await
        .unwrap();

    assert!(dry_provider.status_changes().is_empty());
    assert_eq!(dry.counts().disabled, 0);
    assert_eq!(dry.counts().dry_run_flagged, live.counts().disabled);
    assert_eq!(live.counts().disabled, 3);
    assert_eq!(live_provider.status_changes().len(), 3);
}

#[tokio::test]
async fn test_key_flagged_by_both_policies_gets_one_outcome() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_key("alice", "AKIA1", days_ago(60), KeyStatus::Active)
            .with_last_used("AKIA1", days_ago(45)),
    );
    let sweeper = Sweeper::new(provider.clone());

    let report = sweeper.run_at(&both_policies(30), now()).await.unwrap();

    assert_eq!(report.outcomes().len(), 1);
    assert_eq!(report.counts().disabled, 1);
    assert_eq!(report.outcomes()[0].reason, Some(PolicyKind::Age));
    assert_eq!(provider.status_changes().len(), 1);
}

#[tokio::test]
async fn test_repeated_sweeps_never_error_on_inactive_keys() {
    let provider = Arc::new(
        MemoryProvider::new().with_key("alice", "AKIA1", days_ago(45), KeyStatus::Active),
    );
    let sweeper = Sweeper::new(provider.clone());
    let config = SweepConfig::default().with_age_policy(30);

    let first = sweeper.run_at(&config, now()).await.unwrap();
    let second = sweeper.run_at(&config, now()).await.unwrap();

    assert_eq!(first.outcomes()[0].kind, OutcomeKind::Disabled);
    assert_eq!(first.outcomes()[0].previous_status, Some(KeyStatus::Active));
    assert_eq!(second.outcomes()[0].kind, OutcomeKind::Disabled);
    assert_eq!(second.outcomes()[0].previous_status, Some(KeyStatus::Inactive));
    assert!(!second.has_errors());
    assert_ne!(first.run_id(), second.run_id());
}

#[tokio::test]
async fn test_key_listing_failure_is_isolated_to_account() {
    let provider = Arc::new(fleet().fail_key_listing_for("bob"));
    let sweeper = Sweeper::new(provider.clone());

    let report = sweeper.run_at(&both_policies(30), now()).await.unwrap();

    let errors: Vec<_> = report.outcomes_of(OutcomeKind::Error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].user_name, "bob");
    assert_eq!(errors[0].key_id, None);
    assert_eq!(errors[0].stage, Some(ErrorStage::ListAccessKeys));

    // alice's two keys and carol's one key are fully processed
    assert_eq!(report.users_scanned(), 3);
    assert_eq!(report.keys_scanned(), 3);
    assert_eq!(report.outcomes().len(), 4);
    assert_eq!(
        report
            .outcomes()
            .iter()
            .filter(|o| o.user_name != "bob")
            .count(),
        3
    );
}

#[tokio::test]
async fn test_account_listing_failure_aborts_sweep() {
    let provider = Arc::new(fleet().fail_account_listing());
    let sweeper = Sweeper::new(provider.clone());

    let result = sweeper.run_at(&both_policies(30), now()).await;

    assert!(matches!(result, Err(SweepError::AccountEnumeration(_))));
    assert!(provider.status_changes().is_empty());
}

#[tokio::test]
async fn test_update_failure_does_not_stop_sweep() {
    let provider = Arc::new(fleet().fail_updates_for("AKIAALICEOLD"));
    let sweeper = Sweeper::new(provider.clone());

    let report = sweeper.run_at(&both_policies(30), now()).await.unwrap();

    assert_eq!(report.counts().errors, 1);
    assert_eq!(report.counts().disabled, 2);
    let failed = report.outcomes_of(OutcomeKind::Error).next().unwrap();
    assert_eq!(failed.key_id.as_deref(), Some("AKIAALICEOLD"));
    assert_eq!(failed.stage, Some(ErrorStage::SetStatus));
    assert_eq!(failed.reason, Some(PolicyKind::Age));
}

#[tokio::test]
async fn test_outcomes_follow_account_then_key_order() {
    let expected = vec![
        ("alice", "AKIAALICEOLD", OutcomeKind::Disabled),
        ("alice", "AKIAALICENEW", OutcomeKind::LeftAlone),
        ("bob", "AKIABOBSTALE", OutcomeKind::Disabled),
        ("bob", "AKIABOBNEVER", OutcomeKind::LeftAlone),
        ("carol", "AKIACAROLOFF", OutcomeKind::Disabled),
    ];

    for concurrency in [1, 2, 8] {
        let sweeper = Sweeper::new(Arc::new(fleet()));
        let config = both_policies(30).with_concurrency(concurrency);

        let report = sweeper.run_at(&config, now()).await.unwrap();

        let actual: Vec<(&str, &str, OutcomeKind)> = report
            .outcomes()
            .iter()
            .map(|o| (o.user_name.as_str(), o.key_id.as_deref().unwrap_or(""), o.kind))
            .collect();
        assert_eq!(actual, expected, "concurrency {}", concurrency);
    }
}

#[tokio::test]
async fn test_never_used_keys_survive_inactivity_policy() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_key("alice", "AKIA1", days_ago(3650), KeyStatus::Active)
            .with_key("bob", "AKIA2", days_ago(1), KeyStatus::Active),
    );
    let sweeper = Sweeper::new(provider.clone());

    let report = sweeper
        .run_at(&SweepConfig::default().with_inactivity_policy(0), now())
        .await
        .unwrap();

    assert_eq!(report.counts().left_alone, 2);
    assert_eq!(provider.last_used_lookups(), vec!["AKIA1", "AKIA2"]);
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let sweeper = Sweeper::new(Arc::new(fleet()));

    let report = sweeper
        .run_at(&both_policies(30).dry_run(true), now())
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["dry_run"], true);
    assert_eq!(json["users_scanned"], 3);
    assert_eq!(json["keys_scanned"], 5);
    assert_eq!(json["counts"]["dry_run_flagged"], 3);
    assert_eq!(json["outcomes"][0]["kind"], "dry-run-flagged");
    assert_eq!(json["outcomes"][0]["reason"], "age");
}
