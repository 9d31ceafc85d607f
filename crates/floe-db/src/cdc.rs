//! Postgres adapters for the pipeline's buffer and checkpoint ports.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_pipeline::{BufferError, BufferPort, CheckpointError, CheckpointPort};
use floe_schemas::{BufferStats, BufferedEvent, Checkpoint, Event};

fn buffer_backend(e: sqlx::Error) -> BufferError {
    BufferError::Transport(e.to_string())
}

// ---------------------------------------------------------------------------
// PgBuffer
// ---------------------------------------------------------------------------

/// Durable event buffer on `cdc_buffered_events`.
#[derive(Debug, Clone)]
pub struct PgBuffer {
    pool: PgPool,
}

impl PgBuffer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BufferPort for PgBuffer {
    async fn write(
        &self,
        cancel: CancellationToken,
        events: &[Event],
    ) -> Result<(), BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }
        if events.is_empty() {
            return Ok(());
        }

        // One batch, one transaction: either every event lands or none do.
        let mut tx = self.pool.begin().await.map_err(buffer_backend)?;
        for event in events {
            let payload = serde_json::to_value(event)
                .map_err(|e| BufferError::Rejected(format!("unserializable event: {e}")))?;
            sqlx::query(
                r#"
                insert into cdc_buffered_events (source_id, event, created_at)
                values ($1, $2, now())
                "#,
            )
            .bind(event.source_id)
            .bind(&payload)
            .execute(&mut *tx)
            .await
            .map_err(buffer_backend)?;
        }
        tx.commit().await.map_err(buffer_backend)?;
        Ok(())
    }

    async fn read_batch(
        &self,
        cancel: CancellationToken,
        source_id: Uuid,
        limit: usize,
    ) -> Result<Vec<BufferedEvent>, BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }

        let rows = sqlx::query(
            r#"
            select buffer_id, event, created_at, processed_at
            from cdc_buffered_events
            where source_id = $1 and processed_at is null
            order by buffer_id asc
            limit $2
            "#,
        )
        .bind(source_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(buffer_backend)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: serde_json::Value = row.get("event");
            let event: Event = serde_json::from_value(payload)
                .map_err(|e| BufferError::Rejected(format!("undecodable event row: {e}")))?;
            out.push(BufferedEvent {
                buffer_id: row.get("buffer_id"),
                event,
                created_at: row.get("created_at"),
                processed_at: row.get("processed_at"),
            });
        }
        Ok(out)
    }

    async fn mark_processed(
        &self,
        cancel: CancellationToken,
        buffer_ids: &[i64],
    ) -> Result<(), BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }
        if buffer_ids.is_empty() {
            return Ok(());
        }

        // Already-processed rows are filtered out, so re-marking is a no-op.
        sqlx::query(
            r#"
            update cdc_buffered_events
            set processed_at = now()
            where buffer_id = any($1) and processed_at is null
            "#,
        )
        .bind(buffer_ids)
        .execute(&self.pool)
        .await
        .map_err(buffer_backend)?;
        Ok(())
    }

    async fn cleanup(
        &self,
        cancel: CancellationToken,
        retention: std::time::Duration,
    ) -> Result<u64, BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }

        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let result = sqlx::query(
            r#"
            delete from cdc_buffered_events
            where processed_at is not null and processed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(buffer_backend)?;
        Ok(result.rows_affected())
    }

    async fn stats(
        &self,
        cancel: CancellationToken,
        source_id: Uuid,
    ) -> Result<BufferStats, BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }

        let row = sqlx::query(
            r#"
            select
              count(*)::bigint as total,
              count(*) filter (where processed_at is null)::bigint as unprocessed,
              min(created_at) filter (where processed_at is null) as oldest_unprocessed
            from cdc_buffered_events
            where source_id = $1
            "#,
        )
        .bind(source_id)
        .fetch_one(&self.pool)
        .await
        .map_err(buffer_backend)?;

        let total: i64 = row.get("total");
        let unprocessed: i64 = row.get("unprocessed");
        let oldest_unprocessed: Option<DateTime<Utc>> = row.get("oldest_unprocessed");
        let lag_seconds = oldest_unprocessed
            .map(|t| (Utc::now() - t).num_seconds().max(0))
            .unwrap_or(0);

        Ok(BufferStats {
            total: total.max(0) as u64,
            unprocessed: unprocessed.max(0) as u64,
            oldest_unprocessed,
            lag_seconds,
        })
    }
}

// ---------------------------------------------------------------------------
// PgCheckpoints
// ---------------------------------------------------------------------------

/// Checkpoint store on `cdc_checkpoints`. The upsert refuses to move a
/// source's LSN backwards.
#[derive(Debug, Clone)]
pub struct PgCheckpoints {
    pool: PgPool,
}

impl PgCheckpoints {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CheckpointPort for PgCheckpoints {
    async fn save(
        &self,
        cancel: CancellationToken,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        if cancel.is_cancelled() {
            return Err(CheckpointError::Cancelled);
        }

        sqlx::query(
            r#"
            insert into cdc_checkpoints (source_id, lsn, committed_at)
            values ($1, $2, $3)
            on conflict (source_id) do update
              set lsn = excluded.lsn, committed_at = excluded.committed_at
              where excluded.lsn >= cdc_checkpoints.lsn
            "#,
        )
        .bind(checkpoint.source_id)
        .bind(&checkpoint.lsn)
        .bind(checkpoint.committed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn load(
        &self,
        cancel: CancellationToken,
        source_id: Uuid,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        if cancel.is_cancelled() {
            return Err(CheckpointError::Cancelled);
        }

        let row = sqlx::query(
            r#"
            select source_id, lsn, committed_at
            from cdc_checkpoints
            where source_id = $1
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CheckpointError::Transport(e.to_string()))?;

        Ok(row.map(|r| Checkpoint {
            source_id: r.get("source_id"),
            lsn: r.get("lsn"),
            committed_at: r.get("committed_at"),
        }))
    }
}
