//! Postgres adapter for the alert store port.

use std::collections::BTreeMap;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_alerting::{AlertStore, StoreError};
use floe_schemas::{
    AlertHistoryEntry, AlertInstance, AlertRoute, AlertRule, AlertSeverity, AlertStatus,
    ChannelKind, CmpOp, NotificationChannel, Silence,
};

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn bad_row(what: &str) -> StoreError {
    StoreError::Backend(format!("undecodable {what} row"))
}

fn string_map(value: serde_json::Value) -> Result<BTreeMap<String, String>, StoreError> {
    serde_json::from_value(value).map_err(|_| bad_row("label map"))
}

fn rule_from_row(row: &PgRow) -> Result<AlertRule, StoreError> {
    let op: String = row.get("op");
    let severity: String = row.get("severity");
    Ok(AlertRule {
        id: row.get("id"),
        name: row.get("name"),
        metric_name: row.get("metric_name"),
        label_selectors: string_map(row.get("label_selectors"))?,
        op: CmpOp::parse(&op).ok_or_else(|| bad_row("alert rule op"))?,
        threshold: row.get("threshold"),
        duration_seconds: row.get("duration_seconds"),
        severity: AlertSeverity::parse(&severity).ok_or_else(|| bad_row("alert rule severity"))?,
        labels: string_map(row.get("labels"))?,
        annotations: string_map(row.get("annotations"))?,
        enabled: row.get("enabled"),
    })
}

fn instance_from_row(row: &PgRow) -> Result<AlertInstance, StoreError> {
    let status: String = row.get("status");
    Ok(AlertInstance {
        id: row.get("id"),
        rule_id: row.get("rule_id"),
        fingerprint: row.get("fingerprint"),
        status: AlertStatus::parse(&status).ok_or_else(|| bad_row("alert instance status"))?,
        labels: string_map(row.get("labels"))?,
        current_value: row.get("current_value"),
        fired_at: row.get("fired_at"),
        resolved_at: row.get("resolved_at"),
    })
}

// ---------------------------------------------------------------------------
// PgAlertStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AlertStore for PgAlertStore {
    async fn list_enabled_rules(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<AlertRule>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let rows = sqlx::query(
            r#"
            select id, name, metric_name, label_selectors, op, threshold,
                   duration_seconds, severity, labels, annotations, enabled
            from alert_rules
            where enabled
            order by name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(rule_from_row).collect()
    }

    async fn get_rule(&self, cancel: CancellationToken, id: Uuid) -> Result<AlertRule, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let row = sqlx::query(
            r#"
            select id, name, metric_name, label_selectors, op, threshold,
                   duration_seconds, severity, labels, annotations, enabled
            from alert_rules
            where id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?;

        rule_from_row(&row)
    }

    async fn list_silences(&self, cancel: CancellationToken) -> Result<Vec<Silence>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let rows = sqlx::query(
            r#"select id, matchers, starts_at, ends_at, comment from alert_silences"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(Silence {
                    id: row.get("id"),
                    matchers: string_map(row.get("matchers"))?,
                    starts_at: row.get("starts_at"),
                    ends_at: row.get("ends_at"),
                    comment: row.get("comment"),
                })
            })
            .collect()
    }

    async fn find_firing(
        &self,
        cancel: CancellationToken,
        rule_id: Uuid,
        fingerprint: &str,
    ) -> Result<Option<AlertInstance>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let row = sqlx::query(
            r#"
            select id, rule_id, fingerprint, status, labels, current_value,
                   fired_at, resolved_at
            from alert_instances
            where rule_id = $1 and fingerprint = $2 and status = 'firing'
            "#,
        )
        .bind(rule_id)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(instance_from_row).transpose()
    }

    async fn list_firing(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<AlertInstance>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let rows = sqlx::query(
            r#"
            select id, rule_id, fingerprint, status, labels, current_value,
                   fired_at, resolved_at
            from alert_instances
            where status = 'firing'
            order by fired_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(instance_from_row).collect()
    }

    async fn insert_instance(
        &self,
        cancel: CancellationToken,
        instance: &AlertInstance,
    ) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        sqlx::query(
            r#"
            insert into alert_instances (
              id, rule_id, fingerprint, status, labels, current_value,
              fired_at, resolved_at
            ) values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(instance.id)
        .bind(instance.rule_id)
        .bind(&instance.fingerprint)
        .bind(instance.status.as_str())
        .bind(serde_json::to_value(&instance.labels).unwrap_or_default())
        .bind(instance.current_value)
        .bind(instance.fired_at)
        .bind(instance.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn update_instance(
        &self,
        cancel: CancellationToken,
        instance: &AlertInstance,
    ) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        sqlx::query(
            r#"
            update alert_instances
            set status = $2, labels = $3, current_value = $4, resolved_at = $5
            where id = $1
            "#,
        )
        .bind(instance.id)
        .bind(instance.status.as_str())
        .bind(serde_json::to_value(&instance.labels).unwrap_or_default())
        .bind(instance.current_value)
        .bind(instance.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn append_history(
        &self,
        cancel: CancellationToken,
        entry: &AlertHistoryEntry,
    ) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        sqlx::query(
            r#"
            insert into alert_history (id, instance_id, rule_id, kind, detail, at)
            values ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.instance_id)
        .bind(entry.rule_id)
        .bind(entry.kind.as_str())
        .bind(&entry.detail)
        .bind(entry.at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn routes_for_rule(
        &self,
        cancel: CancellationToken,
        rule_id: Uuid,
    ) -> Result<Vec<AlertRoute>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let rows = sqlx::query(
            r#"
            select id, rule_id, channel_id, repeat_interval_seconds,
                   group_wait_seconds, group_interval_seconds, enabled
            from alert_routes
            where rule_id = $1
            "#,
        )
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| AlertRoute {
                id: row.get("id"),
                rule_id: row.get("rule_id"),
                channel_id: row.get("channel_id"),
                repeat_interval_seconds: row.get("repeat_interval_seconds"),
                group_wait_seconds: row.get("group_wait_seconds"),
                group_interval_seconds: row.get("group_interval_seconds"),
                enabled: row.get("enabled"),
            })
            .collect())
    }

    async fn get_channel(
        &self,
        cancel: CancellationToken,
        id: Uuid,
    ) -> Result<NotificationChannel, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let row = sqlx::query(r#"select id, kind, config, enabled from alert_channels where id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;

        let kind: String = row.get("kind");
        Ok(NotificationChannel {
            id: row.get("id"),
            kind: ChannelKind::parse(&kind).ok_or_else(|| bad_row("channel kind"))?,
            config: row.get("config"),
            enabled: row.get("enabled"),
        })
    }
}
