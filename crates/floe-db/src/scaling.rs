//! Postgres adapter for the scaling store port.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_scaling::{PolicyBundle, ScalingStore, StoreError};
use floe_schemas::{
    CmpOp, ScaleAction, ScaleDirection, ScalingHistoryEntry, ScalingPolicy, ScalingRule,
    ScalingSchedule, ScalingState, TargetKind, TargetRef,
};

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn bad_row(what: &str) -> StoreError {
    StoreError::Backend(format!("undecodable {what} row"))
}

fn target_from_row(row: &PgRow) -> Result<TargetRef, StoreError> {
    let kind: String = row.get("target_kind");
    Ok(TargetRef {
        kind: TargetKind::parse(&kind).ok_or_else(|| bad_row("target kind"))?,
        target_id: row.get("target_id"),
    })
}

fn policy_from_row(row: &PgRow) -> Result<ScalingPolicy, StoreError> {
    Ok(ScalingPolicy {
        id: row.get("id"),
        name: row.get("name"),
        target: target_from_row(row)?,
        min_replicas: row.get("min_replicas"),
        max_replicas: row.get("max_replicas"),
        cooldown_seconds: row.get("cooldown_seconds"),
        max_hourly_cost: row.get("max_hourly_cost"),
        scale_to_zero: row.get("scale_to_zero"),
        enabled: row.get("enabled"),
    })
}

fn rule_from_row(row: &PgRow) -> Result<ScalingRule, StoreError> {
    let direction: String = row.get("direction");
    let op: String = row.get("op");
    Ok(ScalingRule {
        id: row.get("id"),
        policy_id: row.get("policy_id"),
        direction: ScaleDirection::parse(&direction).ok_or_else(|| bad_row("rule direction"))?,
        metric: row.get("metric"),
        label_selectors: serde_json::from_value(row.get("label_selectors"))
            .map_err(|_| bad_row("rule selectors"))?,
        op: CmpOp::parse(&op).ok_or_else(|| bad_row("rule op"))?,
        threshold: row.get("threshold"),
        duration_seconds: row.get("duration_seconds"),
        scale_by: row.get("scale_by"),
    })
}

// ---------------------------------------------------------------------------
// PgScalingStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgScalingStore {
    pool: PgPool,
}

impl PgScalingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ScalingStore for PgScalingStore {
    async fn list_enabled_policies(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<PolicyBundle>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let policy_rows = sqlx::query(
            r#"
            select id, name, target_kind, target_id, min_replicas, max_replicas,
                   cooldown_seconds, max_hourly_cost, scale_to_zero, enabled
            from scaling_policies
            where enabled
            order by name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut bundles = Vec::with_capacity(policy_rows.len());
        for row in &policy_rows {
            let policy = policy_from_row(row)?;

            let rule_rows = sqlx::query(
                r#"
                select id, policy_id, direction, metric, label_selectors, op,
                       threshold, duration_seconds, scale_by
                from scaling_rules
                where policy_id = $1
                order by position, id
                "#,
            )
            .bind(policy.id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
            let rules = rule_rows
                .iter()
                .map(rule_from_row)
                .collect::<Result<Vec<_>, _>>()?;

            let schedule_rows = sqlx::query(
                r#"
                select id, policy_id, cron, desired_replicas, timezone, enabled
                from scaling_schedules
                where policy_id = $1 and enabled
                "#,
            )
            .bind(policy.id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
            let schedules = schedule_rows
                .into_iter()
                .map(|row| ScalingSchedule {
                    id: row.get("id"),
                    policy_id: row.get("policy_id"),
                    cron: row.get("cron"),
                    desired_replicas: row.get("desired_replicas"),
                    timezone: row.get("timezone"),
                    enabled: row.get("enabled"),
                })
                .collect();

            bundles.push(PolicyBundle {
                policy,
                rules,
                schedules,
            });
        }

        Ok(bundles)
    }

    async fn append_history(
        &self,
        cancel: CancellationToken,
        entry: &ScalingHistoryEntry,
    ) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        sqlx::query(
            r#"
            insert into scaling_history (
              id, policy_id, action, target_kind, target_id,
              previous_replicas, new_replicas, reason, dry_run, executed_at
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.policy_id)
        .bind(entry.action.as_str())
        .bind(entry.target.kind.as_str())
        .bind(&entry.target.target_id)
        .bind(entry.previous_replicas)
        .bind(entry.new_replicas)
        .bind(&entry.reason)
        .bind(entry.dry_run)
        .bind(entry.executed_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn save_state(
        &self,
        cancel: CancellationToken,
        state: &ScalingState,
    ) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let pending =
            serde_json::to_value(&state.pending_conditions).unwrap_or_else(|_| serde_json::json!({}));
        sqlx::query(
            r#"
            insert into scaling_states (
              policy_id, current_replicas, last_scale_time, last_action, pending_conditions
            ) values ($1, $2, $3, $4, $5)
            on conflict (policy_id) do update set
              current_replicas = excluded.current_replicas,
              last_scale_time = excluded.last_scale_time,
              last_action = excluded.last_action,
              pending_conditions = excluded.pending_conditions
            "#,
        )
        .bind(state.policy_id)
        .bind(state.current_replicas)
        .bind(state.last_scale_time)
        .bind(state.last_action.map(ScaleAction::as_str))
        .bind(pending)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn load_state(
        &self,
        cancel: CancellationToken,
        policy_id: Uuid,
    ) -> Result<Option<ScalingState>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let row = sqlx::query(
            r#"
            select policy_id, current_replicas, last_scale_time, last_action, pending_conditions
            from scaling_states
            where policy_id = $1
            "#,
        )
        .bind(policy_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let last_action: Option<String> = row.get("last_action");
        let pending: BTreeMap<Uuid, DateTime<Utc>> =
            serde_json::from_value(row.get("pending_conditions"))
                .map_err(|_| bad_row("pending conditions"))?;

        Ok(Some(ScalingState {
            policy_id: row.get("policy_id"),
            current_replicas: row.get("current_replicas"),
            last_scale_time: row.get("last_scale_time"),
            last_action: last_action
                .as_deref()
                .map(|s| ScaleAction::parse(s).ok_or_else(|| bad_row("last action")))
                .transpose()?,
            pending_conditions: pending,
        }))
    }
}
