//! Scaling domain types: policies, rules, schedules, state, history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CmpOp;

// ---------------------------------------------------------------------------
// TargetKind / TargetRef
// ---------------------------------------------------------------------------

/// What kind of component a policy scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    CdcWorker,
    Trino,
    Risingwave,
    Nodes,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::CdcWorker => "cdc-worker",
            TargetKind::Trino => "trino",
            TargetKind::Risingwave => "risingwave",
            TargetKind::Nodes => "nodes",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cdc-worker" => Some(TargetKind::CdcWorker),
            "trino" => Some(TargetKind::Trino),
            "risingwave" => Some(TargetKind::Risingwave),
            "nodes" => Some(TargetKind::Nodes),
            _ => None,
        }
    }
}

/// A concrete scale target: kind plus optional instance id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub target_id: Option<String>,
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target_id {
            Some(id) => write!(f, "{}/{}", self.kind.as_str(), id),
            None => write!(f, "{}", self.kind.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// ScalingPolicy
// ---------------------------------------------------------------------------

/// Replica bounds and cadence for one scale target.
///
/// Invariant: `max_replicas >= min_replicas >= 0`. `scale_to_zero` permits
/// a computed desired of zero; without it the floor is one replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub id: Uuid,
    pub name: String,
    pub target: TargetRef,
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub cooldown_seconds: i64,
    /// Carried for operator dashboards; the engine does not enforce cost.
    pub max_hourly_cost: Option<f64>,
    pub scale_to_zero: bool,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// ScalingRule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Up,
    Down,
}

impl ScaleDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleDirection::Up => "up",
            ScaleDirection::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(ScaleDirection::Up),
            "down" => Some(ScaleDirection::Down),
            _ => None,
        }
    }
}

/// A duration-gated metric condition attached to a policy.
///
/// `scale_by` is signed and its sign must match `direction` (positive for
/// up, negative for down).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRule {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub direction: ScaleDirection,
    pub metric: String,
    pub label_selectors: BTreeMap<String, String>,
    pub op: CmpOp,
    pub threshold: f64,
    pub duration_seconds: i64,
    pub scale_by: i32,
}

// ---------------------------------------------------------------------------
// ScalingSchedule
// ---------------------------------------------------------------------------

/// Cron-driven replica override, evaluated at minute resolution in the
/// schedule's own timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingSchedule {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub cron: String,
    pub desired_replicas: i32,
    /// IANA timezone name, e.g. "Europe/Berlin".
    pub timezone: String,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// ScaleAction / ScalingState / ScalingHistoryEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAction {
    ScaleUp,
    ScaleDown,
    NoOp,
}

impl ScaleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleAction::ScaleUp => "scale_up",
            ScaleAction::ScaleDown => "scale_down",
            ScaleAction::NoOp => "no_op",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scale_up" => Some(ScaleAction::ScaleUp),
            "scale_down" => Some(ScaleAction::ScaleDown),
            "no_op" => Some(ScaleAction::NoOp),
            _ => None,
        }
    }
}

/// Mutable per-policy engine state, persisted periodically.
///
/// `pending_conditions` maps rule id to the instant its condition first
/// held; entries clear when the condition fires or stops holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingState {
    pub policy_id: Uuid,
    pub current_replicas: i32,
    pub last_scale_time: Option<DateTime<Utc>>,
    pub last_action: Option<ScaleAction>,
    pub pending_conditions: BTreeMap<Uuid, DateTime<Utc>>,
}

impl ScalingState {
    pub fn new(policy_id: Uuid) -> Self {
        Self {
            policy_id,
            current_replicas: 0,
            last_scale_time: None,
            last_action: None,
            pending_conditions: BTreeMap::new(),
        }
    }
}

/// Append-only record of every scaling decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingHistoryEntry {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub action: ScaleAction,
    pub target: TargetRef,
    pub previous_replicas: i32,
    pub new_replicas: i32,
    pub reason: String,
    pub dry_run: bool,
    pub executed_at: DateTime<Utc>,
}
