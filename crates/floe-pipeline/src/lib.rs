//! floe-pipeline
//!
//! The CDC pipeline core: an explicit lifecycle state machine, the
//! source/buffer/checkpoint ports, a watermark backpressure controller,
//! and the engine that drives events from a source into the durable
//! buffer while committing checkpoints.

pub mod backpressure;
pub mod janitor;
pub mod pipeline;
pub mod ports;
pub mod state;
pub mod types;

pub use backpressure::{BackpressureConfig, BackpressureController, BufferDepthProbe, DepthProbe};
pub use janitor::run_buffer_janitor;
pub use pipeline::{Pipeline, PipelineConfig};
pub use ports::{
    BufferError, BufferPort, CheckpointError, CheckpointPort, SourceError, SourcePort,
    SourceStream,
};
pub use state::{PipelineState, StateMachine, TransitionError};
pub use types::{PipelineError, PipelineHealth, PipelineStats};
