//! Scenario: scale up after a duration-gated breach, then cooldown.
//!
//! Policy: min=1, max=5, cooldown=300s. One scale-up rule: +2 when
//! lag > 60 for 60s. Current replicas = 1; lag stays at 100.
//!
//! # Invariants under test
//!
//! 1. The third tick (t=60) produces one action: 1 -> 3.
//! 2. No further action happens inside the 300s cooldown even though the
//!    breach persists.
//! 3. Successive executed actions on the policy are >= cooldown apart.
//! 4. new_replicas stays inside [min, max] at every recorded action.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_scaling::{PolicyBundle, ScalingEngine, ScalingEngineConfig};
use floe_schemas::{CmpOp, ScaleAction, ScaleDirection};
use floe_testkit::scaling_store::MemScalingStore;
use floe_testkit::{policy, scaling_rule, RecordingExecutor, ScriptedMetrics};

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
}

fn engine_with(
    store: Arc<MemScalingStore>,
    executor: Arc<RecordingExecutor>,
    metrics: Arc<ScriptedMetrics>,
) -> ScalingEngine {
    ScalingEngine::new(
        store,
        executor,
        metrics,
        ScalingEngineConfig {
            evaluation_interval: std::time::Duration::from_secs(30),
            default_cooldown_seconds: 300,
            dry_run: false,
        },
    )
}

fn seeded() -> (
    Arc<MemScalingStore>,
    Arc<RecordingExecutor>,
    Arc<ScriptedMetrics>,
    Uuid,
) {
    let store = Arc::new(MemScalingStore::new());
    let executor = Arc::new(RecordingExecutor::new());
    let metrics = Arc::new(ScriptedMetrics::new());

    let p = policy(1, 5, 300);
    let policy_id = p.id;
    executor.seed(&p.target, 1);
    let rule = scaling_rule(p.id, ScaleDirection::Up, "lag", CmpOp::Gt, 60.0, 60, 2);
    store.seed_bundle(PolicyBundle {
        policy: p,
        rules: vec![rule],
        schedules: vec![],
    });

    (store, executor, metrics, policy_id)
}

#[tokio::test]
async fn scales_up_once_then_respects_cooldown() {
    let (store, executor, metrics, policy_id) = seeded();
    let engine = engine_with(store.clone(), executor.clone(), metrics.clone());
    let cancel = CancellationToken::new();

    metrics.set_value("lag", &[("source", "orders")], 100.0);

    // t=0 and t=30: pending, no action.
    for secs in [0, 30] {
        let outcome = engine.evaluate_cycle(cancel.clone(), t(secs)).await.unwrap();
        assert!(outcome.decisions.is_empty(), "no action expected at t={secs}");
    }

    // t=60: held for 60s; scale 1 -> 3.
    let outcome = engine.evaluate_cycle(cancel.clone(), t(60)).await.unwrap();
    assert_eq!(outcome.decisions.len(), 1);
    let d = &outcome.decisions[0];
    assert_eq!(d.action, ScaleAction::ScaleUp);
    assert_eq!(d.previous_replicas, 1);
    assert_eq!(d.new_replicas, 3);
    assert!(d.executed);

    assert_eq!(executor.calls().len(), 1);
    let actions = store.scale_actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].new_replicas, 3);

    // Cooldown window: lag persists, nothing happens.
    let mut secs = 90;
    while secs < 360 {
        let outcome = engine.evaluate_cycle(cancel.clone(), t(secs)).await.unwrap();
        assert!(
            outcome.decisions.is_empty(),
            "cooldown must suppress actions at t={secs}"
        );
        secs += 30;
    }
    assert_eq!(executor.calls().len(), 1, "no executor calls during cooldown");

    // After cooldown the rule must hold for its duration again before the
    // next action: t=360 and t=390 pend, t=420 scales 3 -> 5.
    for secs in [360, 390] {
        let outcome = engine.evaluate_cycle(cancel.clone(), t(secs)).await.unwrap();
        assert!(outcome.decisions.is_empty());
    }
    let outcome = engine.evaluate_cycle(cancel.clone(), t(420)).await.unwrap();
    assert_eq!(outcome.decisions.len(), 1);
    assert_eq!(outcome.decisions[0].new_replicas, 5);

    // Cooldown invariant: executed actions are >= 300s apart.
    let actions = store.scale_actions();
    assert_eq!(actions.len(), 2);
    let gap = (actions[1].executed_at - actions[0].executed_at).num_seconds();
    assert!(gap >= 300, "actions {gap}s apart, expected >= cooldown");

    // Clamp invariant.
    let st = store.state_of(policy_id).unwrap();
    assert_eq!(st.current_replicas, 5);
    for action in &actions {
        assert!(action.new_replicas >= 1 && action.new_replicas <= 5);
    }
}

#[tokio::test]
async fn clamp_stops_at_max_replicas() {
    let (store, executor, metrics, _policy_id) = seeded();
    let engine = engine_with(store.clone(), executor.clone(), metrics.clone());
    let cancel = CancellationToken::new();

    // Start at 4: +2 would exceed max=5.
    let target = floe_schemas::TargetRef {
        kind: floe_schemas::TargetKind::CdcWorker,
        target_id: Some("orders".to_string()),
    };
    executor.seed(&target, 4);

    metrics.set_value("lag", &[("source", "orders")], 100.0);
    for secs in [0, 30] {
        engine.evaluate_cycle(cancel.clone(), t(secs)).await.unwrap();
    }
    let outcome = engine.evaluate_cycle(cancel.clone(), t(60)).await.unwrap();

    assert_eq!(outcome.decisions.len(), 1);
    assert_eq!(outcome.decisions[0].new_replicas, 5, "clamped to max_replicas");
}

#[tokio::test]
async fn metric_outage_does_not_clear_the_pending_condition() {
    let (store, executor, metrics, _policy_id) = seeded();
    let engine = engine_with(store.clone(), executor.clone(), metrics.clone());
    let cancel = CancellationToken::new();

    metrics.set_value("lag", &[("source", "orders")], 100.0);
    engine.evaluate_cycle(cancel.clone(), t(0)).await.unwrap();

    // Backend outage mid-hold: the pending entry must survive.
    metrics.fail_with(floe_metrics::MetricsError::Transport("down".to_string()));
    engine.evaluate_cycle(cancel.clone(), t(30)).await.unwrap();

    metrics.set_ok();
    metrics.set_value("lag", &[("source", "orders")], 100.0);
    let outcome = engine.evaluate_cycle(cancel.clone(), t(60)).await.unwrap();
    assert_eq!(
        outcome.decisions.len(),
        1,
        "hold started at t=0 must still fire at t=60 despite the outage tick"
    );
}
