//! floe-testkit
//!
//! In-process doubles for every port: in-memory alert and scaling stores,
//! buffer and checkpoint stores, a scripted source, a scripted metrics
//! backend, a recording channel, and a recording executor. Scenario tests
//! across the workspace compose these instead of a database or network.

pub mod alert_store;
pub mod buffer;
pub mod channels;
pub mod executor;
pub mod fixtures;
pub mod metrics;
pub mod scaling_store;
pub mod source;

pub use alert_store::MemAlertStore;
pub use buffer::{MemBuffer, MemCheckpoints};
pub use channels::{recording_factory, RecordingChannel, SentNotification};
pub use executor::{RecordingExecutor, ScaleCall};
pub use fixtures::{alert_rule, labels, lsn, policy, sample, scaling_rule, source_event};
pub use metrics::ScriptedMetrics;
pub use scaling_store::MemScalingStore;
pub use source::ScriptedSource;
