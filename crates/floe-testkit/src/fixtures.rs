//! Shared builders for scenario tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use floe_metrics::InstantSample;
use floe_schemas::{
    AlertRule, AlertSeverity, CmpOp, Event, EventOp, ScaleDirection, ScalingPolicy, ScalingRule,
    TargetKind, TargetRef,
};

/// Zero-padded LSN so lexicographic order matches numeric order.
pub fn lsn(n: u64) -> String {
    format!("{n:020}")
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A CDC event with sequential id and LSN.
pub fn source_event(source_id: Uuid, seq: u64, at: DateTime<Utc>) -> Event {
    let mut after = serde_json::Map::new();
    after.insert("seq".to_string(), serde_json::json!(seq));

    Event {
        id: seq as i64,
        source_id,
        schema_name: "public".to_string(),
        table_name: "orders".to_string(),
        op: EventOp::Insert,
        lsn: lsn(seq),
        transaction_id: Some(seq.to_string()),
        key_columns: vec!["id".to_string()],
        before: None,
        after: Some(after),
        ts: at,
        metadata: BTreeMap::new(),
    }
}

/// An enabled threshold rule on `metric`.
pub fn alert_rule(metric: &str, op: CmpOp, threshold: f64, duration_seconds: i64) -> AlertRule {
    AlertRule {
        id: Uuid::new_v4(),
        name: format!("{metric}-rule"),
        metric_name: metric.to_string(),
        label_selectors: BTreeMap::new(),
        op,
        threshold,
        duration_seconds,
        severity: AlertSeverity::Warning,
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        enabled: true,
    }
}

pub fn sample(value: f64, pairs: &[(&str, &str)], at: DateTime<Utc>) -> InstantSample {
    InstantSample {
        labels: labels(pairs),
        value,
        at,
    }
}

pub fn policy(min: i32, max: i32, cooldown_seconds: i64) -> ScalingPolicy {
    ScalingPolicy {
        id: Uuid::new_v4(),
        name: "cdc-workers".to_string(),
        target: TargetRef {
            kind: TargetKind::CdcWorker,
            target_id: Some("orders".to_string()),
        },
        min_replicas: min,
        max_replicas: max,
        cooldown_seconds,
        max_hourly_cost: None,
        scale_to_zero: false,
        enabled: true,
    }
}

pub fn scaling_rule(
    policy_id: Uuid,
    direction: ScaleDirection,
    metric: &str,
    op: CmpOp,
    threshold: f64,
    duration_seconds: i64,
    scale_by: i32,
) -> ScalingRule {
    ScalingRule {
        id: Uuid::new_v4(),
        policy_id,
        direction,
        metric: metric.to_string(),
        label_selectors: BTreeMap::new(),
        op,
        threshold,
        duration_seconds,
        scale_by,
    }
}
