//! Alerting domain types: rules, instances, silences, channels, routes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CmpOp;

// ---------------------------------------------------------------------------
// AlertSeverity / AlertStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(AlertSeverity::Info),
            "warning" => Some(AlertSeverity::Warning),
            "critical" => Some(AlertSeverity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "firing" => Some(AlertStatus::Firing),
            "resolved" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AlertRule
// ---------------------------------------------------------------------------

/// A threshold rule over one metric.
///
/// `label_selectors` narrow the queried series (exact match); `labels` are
/// annotating labels merged into every instance the rule produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    pub metric_name: String,
    pub label_selectors: BTreeMap<String, String>,
    pub op: CmpOp,
    pub threshold: f64,
    /// How long the condition must hold continuously before firing. Zero
    /// fires on the first breaching evaluation.
    pub duration_seconds: i64,
    pub severity: AlertSeverity,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// AlertInstance
// ---------------------------------------------------------------------------

/// A firing (or resolved) occurrence of a rule for one label set.
///
/// Exactly one non-resolved instance exists per (rule_id, fingerprint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInstance {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub fingerprint: String,
    pub status: AlertStatus,
    /// Merged labels: rule labels plus series labels, series wins.
    pub labels: BTreeMap<String, String>,
    pub current_value: f64,
    pub fired_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Silence
// ---------------------------------------------------------------------------

/// Label-matcher suppression window.
///
/// A silence applies to an instance when every matcher key/value equals the
/// instance's merged labels, and `starts_at <= now < ends_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Silence {
    pub id: Uuid,
    pub matchers: BTreeMap<String, String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub comment: Option<String>,
}

impl Silence {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }

    /// All matchers must be present and equal in `labels`.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.matchers
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|lv| lv == v))
    }
}

// ---------------------------------------------------------------------------
// NotificationChannel / AlertRoute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Slack,
    Email,
    Webhook,
    Pagerduty,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Slack => "slack",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Pagerduty => "pagerduty",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "slack" => Some(ChannelKind::Slack),
            "email" => Some(ChannelKind::Email),
            "webhook" => Some(ChannelKind::Webhook),
            "pagerduty" => Some(ChannelKind::Pagerduty),
            _ => None,
        }
    }
}

/// A notification destination. `config` is opaque to the core; only the
/// channel implementation interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Uuid,
    pub kind: ChannelKind,
    pub config: serde_json::Value,
    pub enabled: bool,
}

/// Binds a rule to a channel with repeat-interval suppression parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRoute {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub channel_id: Uuid,
    pub repeat_interval_seconds: i64,
    pub group_wait_seconds: i64,
    pub group_interval_seconds: i64,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// AlertHistoryEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertHistoryKind {
    Fired,
    Resolved,
    NotificationSent,
    NotificationFailed,
}

impl AlertHistoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertHistoryKind::Fired => "FIRED",
            AlertHistoryKind::Resolved => "RESOLVED",
            AlertHistoryKind::NotificationSent => "NOTIFICATION_SENT",
            AlertHistoryKind::NotificationFailed => "NOTIFICATION_FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FIRED" => Some(AlertHistoryKind::Fired),
            "RESOLVED" => Some(AlertHistoryKind::Resolved),
            "NOTIFICATION_SENT" => Some(AlertHistoryKind::NotificationSent),
            "NOTIFICATION_FAILED" => Some(AlertHistoryKind::NotificationFailed),
            _ => None,
        }
    }
}

/// Append-only audit row for the alert lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub rule_id: Uuid,
    pub kind: AlertHistoryKind,
    /// Channel id for notification rows, error string for failures.
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}
