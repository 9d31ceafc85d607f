//! Repository port for the scaling subsystem.

use std::fmt;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_schemas::{ScalingHistoryEntry, ScalingPolicy, ScalingRule, ScalingSchedule, ScalingState};

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    Backend(String),
    Cancelled,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "scaling store: not found"),
            StoreError::Backend(msg) => write!(f, "scaling store backend error: {msg}"),
            StoreError::Cancelled => write!(f, "scaling store operation cancelled"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// PolicyBundle
// ---------------------------------------------------------------------------

/// A policy with its rules and schedules, loaded together for one cycle.
/// Rules keep their stored order; the engine takes the first firing rule
/// per direction.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyBundle {
    pub policy: ScalingPolicy,
    pub rules: Vec<ScalingRule>,
    pub schedules: Vec<ScalingSchedule>,
}

// ---------------------------------------------------------------------------
// ScalingStore
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait ScalingStore: Send + Sync {
    async fn list_enabled_policies(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<PolicyBundle>, StoreError>;

    /// Append-only decision log.
    async fn append_history(
        &self,
        cancel: CancellationToken,
        entry: &ScalingHistoryEntry,
    ) -> Result<(), StoreError>;

    async fn save_state(
        &self,
        cancel: CancellationToken,
        state: &ScalingState,
    ) -> Result<(), StoreError>;

    /// `None` when the policy has no persisted state yet.
    async fn load_state(
        &self,
        cancel: CancellationToken,
        policy_id: Uuid,
    ) -> Result<Option<ScalingState>, StoreError>;
}
