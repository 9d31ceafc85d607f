//! floe-scaling
//!
//! The scaling engine: evaluates per-policy metric rules and cron
//! schedules on a fixed interval and emits clamped scale decisions to an
//! executor, honouring cooldown and scale-to-zero policy flags.

pub mod engine;
pub mod executor;
pub mod schedule;
pub mod store;

pub use engine::{PolicyDecision, ScalingCycleOutcome, ScalingEngine, ScalingEngineConfig};
pub use executor::{ExecutorPort, LogExecutor, ScaleError};
pub use schedule::{matches_minute, ScheduleError};
pub use store::{PolicyBundle, ScalingStore, StoreError};
