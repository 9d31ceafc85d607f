//! floe-rules
//!
//! Shared rule-evaluation machinery for the alerting and scaling engines:
//! per-series threshold evaluation, stable series fingerprints, and the
//! duration gate that turns "condition holds now" into "condition has held
//! long enough".

pub mod evaluator;
pub mod fingerprint;
pub mod gate;

pub use evaluator::{evaluate_samples, merge_labels, Evaluation, Evaluator};
pub use fingerprint::fingerprint;
pub use gate::{GateDecision, PendingGate};
