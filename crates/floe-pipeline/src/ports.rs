//! Port boundaries for the pipeline: source, durable buffer, checkpoints.
//!
//! This module defines **only** the contracts and their error types. The
//! Postgres adapters live in `floe-db`; in-process doubles live in
//! `floe-testkit`.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_schemas::{BufferStats, BufferedEvent, Checkpoint, Event};

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Errors a [`SourcePort`] implementation may signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source could not be reached or the session setup failed.
    Connect(String),
    /// The established stream failed mid-flight. Fatal for this run.
    Stream(String),
    /// Cooperative shutdown observed inside the source.
    Cancelled,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Connect(msg) => write!(f, "source connect error: {msg}"),
            SourceError::Stream(msg) => write!(f, "source stream error: {msg}"),
            SourceError::Cancelled => write!(f, "source cancelled"),
        }
    }
}

impl std::error::Error for SourceError {}

// ---------------------------------------------------------------------------
// BufferError
// ---------------------------------------------------------------------------

/// Errors from the durable event buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Connection-level failure (pool exhausted, network, deadline).
    /// Retryable by default.
    Transport(String),
    /// The write violated a buffer constraint. Not retryable.
    Rejected(String),
    /// Cooperative shutdown observed inside the buffer adapter.
    Cancelled,
}

impl BufferError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BufferError::Transport(_))
    }
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Transport(msg) => write!(f, "buffer transport error: {msg}"),
            BufferError::Rejected(msg) => write!(f, "buffer rejected write: {msg}"),
            BufferError::Cancelled => write!(f, "buffer operation cancelled"),
        }
    }
}

impl std::error::Error for BufferError {}

// ---------------------------------------------------------------------------
// CheckpointError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    Transport(String),
    Cancelled,
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Transport(msg) => write!(f, "checkpoint transport error: {msg}"),
            CheckpointError::Cancelled => write!(f, "checkpoint operation cancelled"),
        }
    }
}

impl std::error::Error for CheckpointError {}

// ---------------------------------------------------------------------------
// SourcePort
// ---------------------------------------------------------------------------

/// Channels handed out by a started source.
///
/// `events` is a lazy, finite sequence terminated by close. `errors` is a
/// single-shot fatal signal; after an error the events channel is dead.
pub struct SourceStream {
    pub events: mpsc::Receiver<Event>,
    pub errors: mpsc::Receiver<SourceError>,
}

/// A CDC event source (logical replication slot, binlog reader, ...).
#[async_trait::async_trait]
pub trait SourcePort: Send + Sync {
    /// Begin streaming. `from_lsn` is the checkpointed resume position;
    /// `None` starts from the source-defined head. Events arrive in
    /// source-emit order.
    async fn start(
        &self,
        cancel: CancellationToken,
        from_lsn: Option<String>,
    ) -> Result<SourceStream, SourceError>;

    /// Stop streaming and release the source session.
    async fn stop(&self, cancel: CancellationToken) -> Result<(), SourceError>;

    /// Most recent LSN the source has emitted, if any.
    async fn last_lsn(&self) -> Option<String>;

    /// Human-readable source name for logs and health output.
    fn name(&self) -> &str;

    /// Stable identifier used for checkpoints and buffer keying.
    fn source_id(&self) -> Uuid;
}

// ---------------------------------------------------------------------------
// BufferPort
// ---------------------------------------------------------------------------

/// Durable, ordered event buffer between source and sink.
#[async_trait::async_trait]
pub trait BufferPort: Send + Sync {
    /// Append a batch transactionally (all-or-nothing), preserving order.
    async fn write(&self, cancel: CancellationToken, events: &[Event])
        -> Result<(), BufferError>;

    /// Oldest-first unprocessed events for one source.
    async fn read_batch(
        &self,
        cancel: CancellationToken,
        source_id: Uuid,
        limit: usize,
    ) -> Result<Vec<BufferedEvent>, BufferError>;

    /// Mark rows processed. Already-processed ids are a no-op, not an
    /// error.
    async fn mark_processed(
        &self,
        cancel: CancellationToken,
        buffer_ids: &[i64],
    ) -> Result<(), BufferError>;

    /// Delete processed rows older than `retention`. Returns rows deleted.
    async fn cleanup(
        &self,
        cancel: CancellationToken,
        retention: Duration,
    ) -> Result<u64, BufferError>;

    /// Depth summary for one source.
    async fn stats(
        &self,
        cancel: CancellationToken,
        source_id: Uuid,
    ) -> Result<BufferStats, BufferError>;
}

// ---------------------------------------------------------------------------
// CheckpointPort
// ---------------------------------------------------------------------------

/// Durable resume positions, one committed row per source.
#[async_trait::async_trait]
pub trait CheckpointPort: Send + Sync {
    async fn save(
        &self,
        cancel: CancellationToken,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError>;

    /// `None` when the source has never checkpointed.
    async fn load(
        &self,
        cancel: CancellationToken,
        source_id: Uuid,
    ) -> Result<Option<Checkpoint>, CheckpointError>;
}
