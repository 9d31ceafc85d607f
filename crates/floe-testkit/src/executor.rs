//! Recording executor.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use floe_scaling::{ExecutorPort, ScaleError};
use floe_schemas::TargetRef;

/// One scale invocation as observed by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleCall {
    pub target: String,
    pub desired: i32,
    pub dry_run: bool,
}

/// Tracks replica counts, records every scale call, optionally fails.
#[derive(Default)]
pub struct RecordingExecutor {
    replicas: Mutex<HashMap<String, i32>>,
    calls: Mutex<Vec<ScaleCall>>,
    fail: Mutex<Option<ScaleError>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, target: &TargetRef, replicas: i32) {
        self.replicas
            .lock()
            .unwrap()
            .insert(target.to_string(), replicas);
    }

    pub fn current(&self, target: &TargetRef) -> i32 {
        *self
            .replicas
            .lock()
            .unwrap()
            .get(&target.to_string())
            .unwrap_or(&0)
    }

    pub fn calls(&self) -> Vec<ScaleCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_with(&self, err: ScaleError) {
        *self.fail.lock().unwrap() = Some(err);
    }

    pub fn set_ok(&self) {
        *self.fail.lock().unwrap() = None;
    }
}

#[async_trait::async_trait]
impl ExecutorPort for RecordingExecutor {
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
        if let Some(err) = self.fail.lock().unwrap().clone() {
            return Err(err);
        }
        self.calls.lock().unwrap().push(ScaleCall {
            target: target.to_string(),
            desired,
            dry_run,
        });
        if !dry_run {
            self.replicas
                .lock()
                .unwrap()
                .insert(target.to_string(), desired);
        }
        Ok(())
    }
}
