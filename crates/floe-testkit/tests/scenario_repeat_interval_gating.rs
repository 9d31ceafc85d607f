//! Scenario: repeat-interval suppression on a continuously-firing rule.
//!
//! Rule fires on every 30s evaluation over 600s; the route's
//! repeat_interval is 300s.
//!
//! # Invariants under test
//!
//! 1. Firing notifications over the window number at most 3
//!    (t=0, t=300, t=600).
//! 2. Resolution clears the suppression state, so a re-fire after resolve
//!    notifies immediately.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_alerting::{AlertManager, AlertManagerConfig, NotifyEvent};
use floe_schemas::{AlertRoute, ChannelKind, CmpOp, NotificationChannel};
use floe_testkit::{alert_rule, recording_factory, MemAlertStore, RecordingChannel, ScriptedMetrics};

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
}

fn setup(
    repeat_interval_seconds: i64,
) -> (
    Arc<MemAlertStore>,
    Arc<ScriptedMetrics>,
    Arc<RecordingChannel>,
    AlertManager,
) {
    let store = Arc::new(MemAlertStore::new());
    let metrics = Arc::new(ScriptedMetrics::new());
    let channel = RecordingChannel::new();

    let rule = alert_rule("cpu", CmpOp::Gt, 80.0, 0);
    let channel_id = Uuid::new_v4();
    store.seed_rule(rule.clone());
    store.seed_route(AlertRoute {
        id: Uuid::new_v4(),
        rule_id: rule.id,
        channel_id,
        repeat_interval_seconds,
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
    (store, metrics, channel, manager)
}

#[tokio::test]
async fn firing_sends_are_bounded_by_repeat_interval() {
    let (_store, metrics, channel, manager) = setup(300);
    let cancel = CancellationToken::new();

    metrics.set_value("cpu", &[("host", "a")], 95.0);

    // 21 evaluations: t = 0, 30, ..., 600.
    let mut secs = 0;
    while secs <= 600 {
        manager.evaluate_cycle(cancel.clone(), t(secs)).await.unwrap();
        secs += 30;
    }

    let fired = channel.sent_of(NotifyEvent::Firing);
    assert!(fired <= 3, "expected at most 3 firing sends, got {fired}");
    assert_eq!(fired, 3, "sends expected at t=0, t=300, t=600");
}

#[tokio::test]
async fn resolve_clears_suppression_for_the_next_fire() {
    let (_store, metrics, channel, manager) = setup(3600);
    let cancel = CancellationToken::new();

    // Fire once; suppression now covers the next hour.
    metrics.set_value("cpu", &[("host", "a")], 95.0);
    manager.evaluate_cycle(cancel.clone(), t(0)).await.unwrap();
    assert_eq!(channel.sent_of(NotifyEvent::Firing), 1);

    // Still firing 30s later: suppressed.
    manager.evaluate_cycle(cancel.clone(), t(30)).await.unwrap();
    assert_eq!(channel.sent_of(NotifyEvent::Firing), 1);

    // Clears, resolves, then breaches again: the new fire notifies
    // immediately despite the long repeat interval.
    metrics.set_value("cpu", &[("host", "a")], 10.0);
    manager.evaluate_cycle(cancel.clone(), t(60)).await.unwrap();
    assert_eq!(channel.sent_of(NotifyEvent::Resolved), 1);

    metrics.set_value("cpu", &[("host", "a")], 95.0);
    manager.evaluate_cycle(cancel.clone(), t(90)).await.unwrap();
    assert_eq!(
        channel.sent_of(NotifyEvent::Firing),
        2,
        "resolve must clear the last-sent map"
    );
}
