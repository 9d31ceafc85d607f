//! Scenario: per-entity failures are recorded and never abort a cycle.
//!
//! # Invariants under test
//!
//! 1. A failed notification send lands in history as NOTIFICATION_FAILED
//!    with the error string, and the alert stays firing.
//! 2. A failed executor scale writes a history row with reason
//!    "error: ..." and does not start the cooldown clock.
//! 3. Dry-run scaling records the decision but never invokes the executor.
//! 4. A metrics outage on one rule does not prevent other rules from
//!    evaluating in the same cycle.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_alerting::{AlertManager, AlertManagerConfig, NotifyError};
use floe_scaling::{PolicyBundle, ScaleError, ScalingEngine, ScalingEngineConfig};
use floe_schemas::{
    AlertHistoryKind, AlertRoute, ChannelKind, CmpOp, NotificationChannel, ScaleAction,
    ScaleDirection,
};
use floe_testkit::scaling_store::MemScalingStore;
use floe_testkit::{
    alert_rule, policy, recording_factory, scaling_rule, MemAlertStore, RecordingChannel,
    RecordingExecutor, ScriptedMetrics,
};

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
}

// ---------------------------------------------------------------------------
// 1. Notification failure is recorded, alert stays firing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_send_records_history_and_alert_stays_firing() {
    let store = Arc::new(MemAlertStore::new());
    let metrics = Arc::new(ScriptedMetrics::new());
    let channel = RecordingChannel::new();
    channel.fail_with(NotifyError::Transport("webhook sink down".to_string()));

    let rule = alert_rule("cpu", CmpOp::Gt, 80.0, 0);
    let channel_id = Uuid::new_v4();
    store.seed_rule(rule.clone());
    store.seed_route(AlertRoute {
        id: Uuid::new_v4(),
        rule_id: rule.id,
        channel_id,
        repeat_interval_seconds: 0,
        group_wait_seconds: 0,
        group_interval_seconds: 0,
        enabled: true,
    });
    store.seed_channel(NotificationChannel {
        id: channel_id,
        kind: ChannelKind::Webhook,
        config: serde_json::json!({"url": "http://sink"}),
        enabled: true,
    });

    let manager = AlertManager::new(
        store.clone(),
        metrics.clone(),
        recording_factory(channel.clone()),
        AlertManagerConfig::default(),
    );

    metrics.set_value("cpu", &[("host", "a")], 95.0);
    let outcome = manager
        .evaluate_cycle(CancellationToken::new(), t(0))
        .await
        .unwrap();

    // The cycle completed and the instance fired despite the send failure.
    assert_eq!(outcome.instances_created, 1);
    assert_eq!(store.firing_count(), 1);

    let failures = store.history_of_kind(AlertHistoryKind::NotificationFailed);
    assert_eq!(failures.len(), 1);
    assert!(failures[0]
        .detail
        .as_ref()
        .unwrap()
        .contains("webhook sink down"));
    assert!(store
        .history_of_kind(AlertHistoryKind::NotificationSent)
        .is_empty());
}

// ---------------------------------------------------------------------------
// 2. Executor failure writes an error history row, cooldown not started
// ---------------------------------------------------------------------------

#[tokio::test]
async fn executor_failure_writes_error_row_and_skips_cooldown() {
    let store = Arc::new(MemScalingStore::new());
    let executor = Arc::new(RecordingExecutor::new());
    let metrics = Arc::new(ScriptedMetrics::new());

    let p = policy(1, 5, 300);
    executor.seed(&p.target, 1);
    executor.fail_with(ScaleError::Rejected("quota exceeded".to_string()));
    let rule = scaling_rule(p.id, ScaleDirection::Up, "lag", CmpOp::Gt, 60.0, 0, 2);
    store.seed_bundle(PolicyBundle {
        policy: p,
        rules: vec![rule],
        schedules: vec![],
    });

    let engine = ScalingEngine::new(
        store.clone(),
        executor.clone(),
        metrics.clone(),
        ScalingEngineConfig::default(),
    );
    let cancel = CancellationToken::new();

    metrics.set_value("lag", &[("source", "orders")], 100.0);
    let outcome = engine.evaluate_cycle(cancel.clone(), t(0)).await.unwrap();

    // Decision made but not executed.
    assert_eq!(outcome.decisions.len(), 1);
    assert!(!outcome.decisions[0].executed);

    // Two history rows: the decision and the error.
    let history = store.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, ScaleAction::ScaleUp);
    assert_eq!(history[1].action, ScaleAction::NoOp);
    assert!(history[1].reason.starts_with("error: "));
    assert!(history[1].reason.contains("quota exceeded"));

    // Cooldown applies to actual scaling actions only: once the executor
    // recovers, the very next firing evaluation may scale.
    executor.set_ok();
    let outcome = engine.evaluate_cycle(cancel.clone(), t(30)).await.unwrap();
    assert_eq!(outcome.decisions.len(), 1);
    assert!(outcome.decisions[0].executed);
}

// ---------------------------------------------------------------------------
// 3. Dry-run records the decision without invoking the executor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dry_run_records_but_does_not_execute() {
    let store = Arc::new(MemScalingStore::new());
    let executor = Arc::new(RecordingExecutor::new());
    let metrics = Arc::new(ScriptedMetrics::new());

    let p = policy(1, 5, 300);
    executor.seed(&p.target, 1);
    let rule = scaling_rule(p.id, ScaleDirection::Up, "lag", CmpOp::Gt, 60.0, 0, 2);
    store.seed_bundle(PolicyBundle {
        policy: p,
        rules: vec![rule],
        schedules: vec![],
    });

    let engine = ScalingEngine::new(
        store.clone(),
        executor.clone(),
        metrics.clone(),
        ScalingEngineConfig {
            dry_run: true,
            ..ScalingEngineConfig::default()
        },
    );

    metrics.set_value("lag", &[("source", "orders")], 100.0);
    let outcome = engine
        .evaluate_cycle(CancellationToken::new(), t(0))
        .await
        .unwrap();

    assert_eq!(outcome.decisions.len(), 1);
    assert!(outcome.decisions[0].dry_run);
    assert!(!outcome.decisions[0].executed);

    assert!(executor.calls().is_empty(), "dry-run must not reach the executor");
    let history = store.history();
    assert_eq!(history.len(), 1);
    assert!(history[0].dry_run);
}

// ---------------------------------------------------------------------------
// 4. One rule's metrics outage does not block the rest of the cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rule_evaluation_failure_does_not_abort_the_cycle() {
    let store = Arc::new(MemAlertStore::new());
    let metrics = Arc::new(ScriptedMetrics::new());
    let channel = RecordingChannel::new();

    // Two rules; the first targets a metric with no series at all. An
    // empty series set yields no evaluations and must not stop the second
    // rule from firing.
    let absent = alert_rule("metric_that_is_absent", CmpOp::Gt, 1.0, 0);
    let healthy = alert_rule("cpu", CmpOp::Gt, 80.0, 0);
    store.seed_rule(absent);
    store.seed_rule(healthy);

    let manager = AlertManager::new(
        store.clone(),
        metrics.clone(),
        recording_factory(channel),
        AlertManagerConfig::default(),
    );

    metrics.set_value("cpu", &[("host", "a")], 95.0);
    let outcome = manager
        .evaluate_cycle(CancellationToken::new(), t(0))
        .await
        .unwrap();

    assert_eq!(outcome.rules_evaluated, 2);
    assert_eq!(outcome.instances_created, 1, "healthy rule still fires");
}
