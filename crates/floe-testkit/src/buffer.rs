//! In-memory buffer and checkpoint stores with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_pipeline::{BufferError, BufferPort, CheckpointError, CheckpointPort};
use floe_schemas::{BufferStats, BufferedEvent, Checkpoint, Event};

// ---------------------------------------------------------------------------
// MemBuffer
// ---------------------------------------------------------------------------

/// In-memory [`BufferPort`]. `fail_next_writes(n)` makes the next `n`
/// writes fail transiently, which exercises the pipeline's retry path.
#[derive(Default)]
pub struct MemBuffer {
    rows: Mutex<Vec<BufferedEvent>>,
    next_id: Mutex<i64>,
    transient_failures: AtomicU32,
}

impl MemBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    pub fn events_for(&self, source_id: Uuid) -> Vec<Event> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.event.source_id == source_id)
            .map(|r| r.event.clone())
            .collect()
    }

    pub fn all_rows(&self) -> Vec<BufferedEvent> {
        self.rows.lock().unwrap().clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl BufferPort for MemBuffer {
    async fn write(
        &self,
        cancel: CancellationToken,
        events: &[Event],
    ) -> Result<(), BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }

        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(BufferError::Transport("injected failure".to_string()));
        }

        // All-or-nothing: allocate ids only once we know nothing can fail.
        let mut rows = self.rows.lock().unwrap();
        let mut next = self.next_id.lock().unwrap();
        for event in events {
            *next += 1;
            rows.push(BufferedEvent {
                buffer_id: *next,
                event: event.clone(),
                created_at: Utc::now(),
                processed_at: None,
            });
        }
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
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.event.source_id == source_id && r.processed_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_processed(
        &self,
        cancel: CancellationToken,
        buffer_ids: &[i64],
    ) -> Result<(), BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            // Only the first marking sets the timestamp; re-marking is a
            // no-op.
            if buffer_ids.contains(&row.buffer_id) && row.processed_at.is_none() {
                row.processed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn cleanup(
        &self,
        cancel: CancellationToken,
        retention: Duration,
    ) -> Result<u64, BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.processed_at.map_or(true, |p| p >= cutoff));
        Ok((before - rows.len()) as u64)
    }

    async fn stats(
        &self,
        cancel: CancellationToken,
        source_id: Uuid,
    ) -> Result<BufferStats, BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }
        let rows = self.rows.lock().unwrap();
        let for_source: Vec<_> = rows
            .iter()
            .filter(|r| r.event.source_id == source_id)
            .collect();
        let unprocessed: Vec<_> = for_source
            .iter()
            .filter(|r| r.processed_at.is_none())
            .collect();
        let oldest_unprocessed = unprocessed.iter().map(|r| r.created_at).min();

        Ok(BufferStats {
            total: for_source.len() as u64,
            unprocessed: unprocessed.len() as u64,
            oldest_unprocessed,
            lag_seconds: oldest_unprocessed
                .map(|t| (Utc::now() - t).num_seconds().max(0))
                .unwrap_or(0),
        })
    }
}

// ---------------------------------------------------------------------------
// MemCheckpoints
// ---------------------------------------------------------------------------

/// In-memory [`CheckpointPort`] enforcing monotonic LSNs per source.
#[derive(Default)]
pub struct MemCheckpoints {
    rows: Mutex<HashMap<Uuid, Checkpoint>>,
}

impl MemCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_id: Uuid) -> Option<Checkpoint> {
        self.rows.lock().unwrap().get(&source_id).cloned()
    }

    /// Seed a pre-existing checkpoint (restart scenarios).
    pub fn seed(&self, checkpoint: Checkpoint) {
        self.rows
            .lock()
            .unwrap()
            .insert(checkpoint.source_id, checkpoint);
    }
}

#[async_trait::async_trait]
impl CheckpointPort for MemCheckpoints {
    async fn save(
        &self,
        cancel: CancellationToken,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        if cancel.is_cancelled() {
            return Err(CheckpointError::Cancelled);
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.get(&checkpoint.source_id) {
            // Refuse to move the position backwards.
            Some(existing) if checkpoint.lsn < existing.lsn => Ok(()),
            _ => {
                rows.insert(checkpoint.source_id, checkpoint.clone());
                Ok(())
            }
        }
    }

    async fn load(
        &self,
        cancel: CancellationToken,
        source_id: Uuid,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        if cancel.is_cancelled() {
            return Err(CheckpointError::Cancelled);
        }
        Ok(self.rows.lock().unwrap().get(&source_id).cloned())
    }
}
