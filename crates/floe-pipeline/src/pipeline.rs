//! The CDC pipeline engine: source -> durable buffer, with periodic
//! checkpoints, retry on buffer writes, and pause/park semantics.
//!
//! # Ordering
//!
//! One pipeline has exactly one consumer of its source's event channel;
//! events are processed strictly in source-emit order and buffer writes
//! preserve that order. Checkpoints are advisory: replay from an older LSN
//! after a restart produces duplicates in the buffer, which downstream
//! consumers tolerate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use floe_retry::{execute, OpError, RetryError, RetryPolicy};
use floe_schemas::{Checkpoint, Event};

use crate::backpressure::{BackpressureConfig, BackpressureController, BufferDepthProbe};
use crate::ports::{BufferError, BufferPort, CheckpointPort, SourcePort};
use crate::state::{PipelineState, StateMachine};
use crate::types::{PipelineError, PipelineHealth, PipelineStats};

/// Poll granularity while parked in a non-Running state.
const PARK_POLL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub checkpoint_interval: Duration,
    pub retry: RetryPolicy,
    /// `None` disables the backpressure controller.
    pub backpressure: Option<BackpressureConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            backpressure: Some(BackpressureConfig::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

struct Inner {
    stats: PipelineStats,
    last_error: Option<String>,
}

/// One replication pipeline from a single source into the durable buffer.
pub struct Pipeline {
    source: Arc<dyn SourcePort>,
    buffer: Arc<dyn BufferPort>,
    checkpoints: Arc<dyn CheckpointPort>,
    state: Arc<StateMachine>,
    cfg: PipelineConfig,
    inner: Mutex<Inner>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn SourcePort>,
        buffer: Arc<dyn BufferPort>,
        checkpoints: Arc<dyn CheckpointPort>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            source,
            buffer,
            checkpoints,
            state: Arc::new(StateMachine::new()),
            cfg,
            inner: Mutex::new(Inner {
                stats: PipelineStats::default(),
                last_error: None,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Public surface
    // -----------------------------------------------------------------------

    pub fn state(&self) -> PipelineState {
        self.state.state()
    }

    /// Lifecycle observer registration, delegated to the state machine.
    pub fn on_transition(
        &self,
        f: impl Fn(PipelineState, PipelineState) + Send + Sync + 'static,
    ) {
        self.state.on_transition(f);
    }

    /// Operator-initiated pause. Parked events resume on `resume`.
    pub fn pause(&self) -> Result<(), crate::state::TransitionError> {
        self.state.transition(PipelineState::Paused).map(|_| ())
    }

    pub fn resume(&self) -> Result<(), crate::state::TransitionError> {
        self.state.transition(PipelineState::Running).map(|_| ())
    }

    pub fn stats(&self) -> PipelineStats {
        self.inner.lock().expect("pipeline lock poisoned").stats.clone()
    }

    pub fn health(&self) -> PipelineHealth {
        let state = self.state.state();
        let detail = self
            .inner
            .lock()
            .expect("pipeline lock poisoned")
            .last_error
            .clone();
        PipelineHealth {
            state,
            healthy: !matches!(state, PipelineState::Failed),
            detail: if state == PipelineState::Failed {
                detail
            } else {
                None
            },
        }
    }

    // -----------------------------------------------------------------------
    // run
    // -----------------------------------------------------------------------

    /// Drive the pipeline until the source finishes, a fatal error occurs,
    /// or `cancel` fires. Restartable: a Stopped or Failed pipeline may be
    /// run again and resumes from its checkpoint.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PipelineError> {
        // Re-enter Starting when this is a restart.
        match self.state.state() {
            PipelineState::Starting => {}
            PipelineState::Stopped | PipelineState::Failed => {
                self.state.transition(PipelineState::Starting)?;
            }
            other => {
                return Err(PipelineError::Transition(crate::state::TransitionError {
                    from: other,
                    to: PipelineState::Starting,
                }))
            }
        }

        let source_id = self.source.source_id();
        {
            let mut inner = self.inner.lock().expect("pipeline lock poisoned");
            inner.stats.restarts += 1;
            inner.stats.started_at = Some(Utc::now());
            inner.last_error = None;
        }

        // Adopt the persisted position, if any.
        let mut last_lsn: Option<String> = match self
            .checkpoints
            .load(cancel.child_token(), source_id)
            .await
        {
            Ok(cp) => cp.map(|c| c.lsn),
            Err(e) => {
                self.record_failure(&e.to_string());
                let _ = self.state.transition(PipelineState::Failed);
                return Err(PipelineError::Checkpoint(e));
            }
        };
        if let Some(lsn) = &last_lsn {
            info!(source = self.source.name(), lsn, "resuming from checkpoint");
            self.inner.lock().expect("pipeline lock poisoned").stats.last_lsn =
                Some(lsn.clone());
        }

        let stream = match self.source.start(cancel.child_token(), last_lsn.clone()).await {
            Ok(s) => s,
            Err(e) => {
                self.record_failure(&e.to_string());
                let _ = self.state.transition(PipelineState::Failed);
                return Err(PipelineError::Source(e));
            }
        };
        let mut events = stream.events;
        let mut errors = stream.errors;
        let mut errors_open = true;

        self.state.transition(PipelineState::Running)?;
        info!(source = self.source.name(), "pipeline running");

        // Backpressure controller, if configured.
        let bp_cancel = cancel.child_token();
        let bp_handle = self.cfg.backpressure.map(|bcfg| {
            let probe = Arc::new(BufferDepthProbe::new(Arc::clone(&self.buffer), source_id));
            let ctl = BackpressureController::new(probe, Arc::clone(&self.state), bcfg);
            let token = bp_cancel.clone();
            tokio::spawn(async move { ctl.run(token).await })
        });

        let mut checkpoint_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + self.cfg.checkpoint_interval,
            self.cfg.checkpoint_interval,
        );
        checkpoint_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = self.source.name(), "cancellation observed; draining");
                    break Ok(());
                }

                maybe_err = errors.recv(), if errors_open => {
                    match maybe_err {
                        Some(e) => {
                            warn!(source = self.source.name(), error = %e, "fatal source error");
                            self.record_failure(&e.to_string());
                            let _ = self.state.transition(PipelineState::Failed);
                            break Err(PipelineError::Source(e));
                        }
                        // Error channel closed without a signal.
                        None => errors_open = false,
                    }
                }

                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else {
                        info!(source = self.source.name(), "source stream finished");
                        break Ok(());
                    };

                    // Park while not Running (operator pause or backpressure).
                    if !self.state.can_process() && !self.park_until_running(&cancel).await {
                        break Ok(());
                    }

                    match self.process_event(&event, &cancel).await {
                        Ok(()) => {
                            last_lsn = Some(event.lsn.clone());
                            let mut inner = self.inner.lock().expect("pipeline lock poisoned");
                            inner.stats.events_processed += 1;
                            inner.stats.last_event_at = Some(event.ts);
                            inner.stats.last_lsn = Some(event.lsn.clone());
                        }
                        Err(e) if e.is_cancelled() => break Ok(()),
                        Err(e) => {
                            warn!(source = self.source.name(), error = %e, "buffer write failed terminally");
                            self.record_failure(&e.to_string());
                            self.inner.lock().expect("pipeline lock poisoned").stats.events_failed += 1;
                            let _ = self.state.transition(PipelineState::Failed);
                            break Err(PipelineError::Buffer(e));
                        }
                    }
                }

                _ = checkpoint_tick.tick() => {
                    self.persist_checkpoint(source_id, &last_lsn, cancel.child_token()).await;
                }
            }
        };

        bp_cancel.cancel();
        if let Some(h) = bp_handle {
            let _ = h.await;
        }

        match result {
            Ok(()) => {
                // Clean shutdown: Stopping, final checkpoint under a fresh
                // token (the run token may already be cancelled), stop the
                // source, Stopped.
                let _ = self.state.transition(PipelineState::Stopping);
                self.persist_checkpoint(source_id, &last_lsn, CancellationToken::new())
                    .await;
                if let Err(e) = self.source.stop(CancellationToken::new()).await {
                    warn!(source = self.source.name(), error = %e, "source stop failed");
                }
                self.state.transition(PipelineState::Stopped)?;
                info!(source = self.source.name(), "pipeline stopped");
                Ok(())
            }
            Err(e) => {
                // Already Failed; release the source session best-effort.
                if let Err(stop_err) = self.source.stop(CancellationToken::new()).await {
                    warn!(source = self.source.name(), error = %stop_err, "source stop failed");
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Wait until Running again. Returns `false` when cancelled or the
    /// pipeline left the live states while parked.
    async fn park_until_running(&self, cancel: &CancellationToken) -> bool {
        loop {
            match self.state.state() {
                PipelineState::Running => return true,
                PipelineState::Stopping | PipelineState::Stopped | PipelineState::Failed => {
                    return false
                }
                _ => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(PARK_POLL) => {}
            }
        }
    }

    /// Write one event to the buffer under the retry policy.
    async fn process_event(
        &self,
        event: &Event,
        cancel: &CancellationToken,
    ) -> Result<(), RetryError<BufferError>> {
        let buffer = Arc::clone(&self.buffer);
        let op_cancel = cancel.clone();
        execute(&self.cfg.retry, cancel, move || {
            let buffer = Arc::clone(&buffer);
            let token = op_cancel.clone();
            let ev = event.clone();
            async move {
                buffer.write(token, &[ev]).await.map_err(|e| {
                    if e.is_transient() {
                        OpError::Transient(e)
                    } else {
                        OpError::Permanent(e)
                    }
                })
            }
        })
        .await
    }

    /// Persist the current position. Never writes an empty LSN; failures
    /// log and are tolerated (the next start replays from the last durable
    /// position).
    async fn persist_checkpoint(
        &self,
        source_id: uuid::Uuid,
        last_lsn: &Option<String>,
        cancel: CancellationToken,
    ) {
        let Some(lsn) = last_lsn.as_ref().filter(|l| !l.is_empty()) else {
            return;
        };
        let cp = Checkpoint {
            source_id,
            lsn: lsn.clone(),
            committed_at: Utc::now(),
        };
        if let Err(e) = self.checkpoints.save(cancel, &cp).await {
            warn!(source = self.source.name(), error = %e, "checkpoint save failed");
        }
    }

    fn record_failure(&self, detail: &str) {
        self.inner.lock().expect("pipeline lock poisoned").last_error = Some(detail.to_string());
    }
}
