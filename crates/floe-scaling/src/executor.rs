//! Executor boundary: the component that actually changes replica counts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::info;

use floe_schemas::TargetRef;

// ---------------------------------------------------------------------------
// ScaleError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleError {
    /// The control plane could not be reached.
    Transport(String),
    /// The control plane refused the request (unknown target, quota).
    Rejected(String),
    Cancelled,
}

impl fmt::Display for ScaleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleError::Transport(msg) => write!(f, "executor transport error: {msg}"),
            ScaleError::Rejected(msg) => write!(f, "executor rejected request: {msg}"),
            ScaleError::Cancelled => write!(f, "executor operation cancelled"),
        }
    }
}

impl std::error::Error for ScaleError {}

// ---------------------------------------------------------------------------
// ExecutorPort
// ---------------------------------------------------------------------------

/// Replica observation and mutation for scale targets.
#[async_trait::async_trait]
pub trait ExecutorPort: Send + Sync {
    async fn get_current_replicas(
        &self,
        cancel: CancellationToken,
        target: &TargetRef,
    ) -> Result<i32, ScaleError>;

    /// Apply `desired` replicas. With `dry_run` the executor must not
    /// change anything.
    async fn scale(
        &self,
        cancel: CancellationToken,
        target: &TargetRef,
        desired: i32,
        dry_run: bool,
    ) -> Result<(), ScaleError>;
}

// ---------------------------------------------------------------------------
// LogExecutor
// ---------------------------------------------------------------------------

/// In-process executor that tracks replica counts in a map and logs every
/// scale call. Useful for local runs and as the default until a real
/// control-plane adapter is configured.
#[derive(Debug, Default)]
pub struct LogExecutor {
    replicas: Mutex<HashMap<String, i32>>,
}

impl LogExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the observed replica count for a target.
    pub fn seed(&self, target: &TargetRef, replicas: i32) {
        self.replicas
            .lock()
            .expect("executor lock poisoned")
            .insert(target.to_string(), replicas);
    }

    pub fn current(&self, target: &TargetRef) -> i32 {
        *self
            .replicas
            .lock()
            .expect("executor lock poisoned")
            .get(&target.to_string())
            .unwrap_or(&0)
    }
}

#[async_trait::async_trait]
impl ExecutorPort for LogExecutor {
    async fn get_current_replicas(
        &self,
        _cancel: CancellationToken,
        target: &TargetRef,
    ) -> Result<i32, ScaleError> {
        Ok(self.current(target))
    }

    async fn scale(
        &self,
        _cancel: CancellationToken,
        target: &TargetRef,
        desired: i32,
        dry_run: bool,
    ) -> Result<(), ScaleError> {
        info!(target = %target, desired, dry_run, "scale requested");
        if !dry_run {
            self.replicas
                .lock()
                .expect("executor lock poisoned")
                .insert(target.to_string(), desired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_schemas::TargetKind;

    fn target() -> TargetRef {
        TargetRef {
            kind: TargetKind::CdcWorker,
            target_id: Some("orders".to_string()),
        }
    }

    #[tokio::test]
    async fn log_executor_tracks_replicas() {
        let ex = LogExecutor::new();
        let t = target();
        ex.seed(&t, 2);

        let cancel = CancellationToken::new();
        assert_eq!(ex.get_current_replicas(cancel.clone(), &t).await.unwrap(), 2);

        ex.scale(cancel.clone(), &t, 5, false).await.unwrap();
        assert_eq!(ex.get_current_replicas(cancel.clone(), &t).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn dry_run_does_not_mutate() {
        let ex = LogExecutor::new();
        let t = target();
        ex.seed(&t, 2);

        ex.scale(CancellationToken::new(), &t, 5, true).await.unwrap();
        assert_eq!(ex.current(&t), 2);
    }
}
