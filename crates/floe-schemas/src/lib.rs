//! floe-schemas
//!
//! Shared domain types for the CDC pipeline, alerting, and scaling
//! subsystems. Pure data: serde round-trippable, no I/O, no business logic
//! beyond small comparison/merge helpers used by every consumer.

pub mod alerting;
pub mod cdc;
pub mod scaling;

pub use alerting::{
    AlertHistoryEntry, AlertHistoryKind, AlertInstance, AlertRoute, AlertRule, AlertSeverity,
    AlertStatus, ChannelKind, NotificationChannel, Silence,
};
pub use cdc::{BufferStats, BufferedEvent, Checkpoint, Event, EventOp};
pub use scaling::{
    ScaleAction, ScaleDirection, ScalingHistoryEntry, ScalingPolicy, ScalingRule, ScalingSchedule,
    ScalingState, TargetKind, TargetRef,
};

use serde::{Deserialize, Serialize};

/// Comparison operator used by both alert rules and scaling rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Gt,
    Lt,
    Eq,
    Ge,
    Le,
}

impl CmpOp {
    /// Apply the operator to a sampled value against a rule threshold.
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            CmpOp::Gt => value > threshold,
            CmpOp::Lt => value < threshold,
            CmpOp::Eq => value == threshold,
            CmpOp::Ge => value >= threshold,
            CmpOp::Le => value <= threshold,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Eq => "=",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            ">" | "gt" => Some(CmpOp::Gt),
            "<" | "lt" => Some(CmpOp::Lt),
            "=" | "==" | "eq" => Some(CmpOp::Eq),
            ">=" | "ge" => Some(CmpOp::Ge),
            "<=" | "le" => Some(CmpOp::Le),
            _ => None,
        }
    }
}
