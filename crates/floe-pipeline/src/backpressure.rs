//! Watermark backpressure: pause the pipeline when buffer depth is high,
//! resume when it has drained.
//!
//! The controller only ever drives Running -> Paused and Paused -> Running;
//! every other state is left alone. Probe failures are fail-open: they log
//! and change nothing, so a flaky stats query cannot stall a healthy
//! pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ports::{BufferError, BufferPort};
use crate::state::{PipelineState, StateMachine};

// ---------------------------------------------------------------------------
// DepthProbe
// ---------------------------------------------------------------------------

/// Reads the current buffer depth (unprocessed events).
#[async_trait::async_trait]
pub trait DepthProbe: Send + Sync {
    async fn depth(&self, cancel: CancellationToken) -> Result<u64, BufferError>;
}

/// Probe backed by [`BufferPort::stats`] for one source.
pub struct BufferDepthProbe {
    buffer: Arc<dyn BufferPort>,
    source_id: Uuid,
}

impl BufferDepthProbe {
    pub fn new(buffer: Arc<dyn BufferPort>, source_id: Uuid) -> Self {
        Self { buffer, source_id }
    }
}

#[async_trait::async_trait]
impl DepthProbe for BufferDepthProbe {
    async fn depth(&self, cancel: CancellationToken) -> Result<u64, BufferError> {
        Ok(self.buffer.stats(cancel, self.source_id).await?.unprocessed)
    }
}

// ---------------------------------------------------------------------------
// BackpressureConfig / BackpressureController
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressureConfig {
    /// Depth at or above which a Running pipeline is paused.
    pub high_watermark: u64,
    /// Depth at or below which a Paused pipeline resumes.
    pub low_watermark: u64,
    pub check_interval: Duration,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            high_watermark: 10_000,
            low_watermark: 1_000,
            check_interval: Duration::from_secs(5),
        }
    }
}

pub struct BackpressureController {
    probe: Arc<dyn DepthProbe>,
    state: Arc<StateMachine>,
    cfg: BackpressureConfig,
}

impl BackpressureController {
    pub fn new(probe: Arc<dyn DepthProbe>, state: Arc<StateMachine>, cfg: BackpressureConfig) -> Self {
        Self { probe, state, cfg }
    }

    /// One probe-and-decide step. Factored out of the loop so tests can
    /// drive it without timers.
    pub async fn check_once(&self, cancel: CancellationToken) {
        let depth = match self.probe.depth(cancel).await {
            Ok(d) => d,
            Err(e) => {
                // Fail-open: a broken probe must not wedge the pipeline.
                warn!(error = %e, "backpressure probe failed; leaving state unchanged");
                return;
            }
        };

        let state = self.state.state();
        match state {
            PipelineState::Running if depth >= self.cfg.high_watermark => {
                info!(depth, high = self.cfg.high_watermark, "buffer above high watermark; pausing");
                if let Err(e) = self.state.transition(PipelineState::Paused) {
                    debug!(error = %e, "pause transition lost a race; skipping");
                }
            }
            PipelineState::Paused if depth <= self.cfg.low_watermark => {
                info!(depth, low = self.cfg.low_watermark, "buffer drained to low watermark; resuming");
                if let Err(e) = self.state.transition(PipelineState::Running) {
                    debug!(error = %e, "resume transition lost a race; skipping");
                }
            }
            _ => {
                debug!(depth, state = state.as_str(), "backpressure check: no change");
            }
        }
    }

    /// Poll until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cfg.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => self.check_once(cancel.clone()).await,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
