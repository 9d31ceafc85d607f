//! Pipeline stats, health, and the engine's terminal error type.

use chrono::{DateTime, Utc};

use crate::ports::{BufferError, CheckpointError, SourceError};
use crate::state::{PipelineState, TransitionError};
use floe_retry::RetryError;

// ---------------------------------------------------------------------------
// PipelineStats
// ---------------------------------------------------------------------------

/// Point-in-time counters for one pipeline, cheap to clone out of the
/// engine for status endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub events_processed: u64,
    pub events_failed: u64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_lsn: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// Times `run` was entered over the life of this engine value.
    pub restarts: u32,
}

// ---------------------------------------------------------------------------
// PipelineHealth
// ---------------------------------------------------------------------------

/// Operator-facing health summary.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineHealth {
    pub state: PipelineState,
    pub healthy: bool,
    /// Last failure cause when `state == Failed`.
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Terminal failure of a pipeline run.
#[derive(Debug)]
pub enum PipelineError {
    Source(SourceError),
    /// Buffer write failed even under retry.
    Buffer(RetryError<BufferError>),
    Checkpoint(CheckpointError),
    Transition(TransitionError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Source(e) => write!(f, "pipeline source failure: {e}"),
            PipelineError::Buffer(e) => write!(f, "pipeline buffer failure: {e}"),
            PipelineError::Checkpoint(e) => write!(f, "pipeline checkpoint failure: {e}"),
            PipelineError::Transition(e) => write!(f, "pipeline state failure: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<TransitionError> for PipelineError {
    fn from(e: TransitionError) -> Self {
        PipelineError::Transition(e)
    }
}
