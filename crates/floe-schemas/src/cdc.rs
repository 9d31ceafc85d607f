//! CDC event, checkpoint, and buffer envelope types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EventOp
// ---------------------------------------------------------------------------

/// Row-level operation carried by a CDC event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOp {
    Insert,
    Update,
    Delete,
    Truncate,
}

impl EventOp {
    pub fn as_str(self) -> &'static str {
        match self {
            EventOp::Insert => "insert",
            EventOp::Update => "update",
            EventOp::Delete => "delete",
            EventOp::Truncate => "truncate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(EventOp::Insert),
            "update" => Some(EventOp::Update),
            "delete" => Some(EventOp::Delete),
            "truncate" => Some(EventOp::Truncate),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A single change event as emitted by a source.
///
/// Immutable once emitted. `id` is monotonic within its source; `lsn` is an
/// opaque position whose lexicographic order matches the source's commit
/// order. `before`/`after` carry the column image for the operation
/// (`before` absent on insert, `after` absent on delete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub source_id: Uuid,
    pub schema_name: String,
    pub table_name: String,
    pub op: EventOp,
    pub lsn: String,
    pub transaction_id: Option<String>,
    /// Ordered key columns for the affected row.
    pub key_columns: Vec<String>,
    pub before: Option<serde_json::Map<String, serde_json::Value>>,
    pub after: Option<serde_json::Map<String, serde_json::Value>>,
    pub ts: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Durable record of the last committed source position.
///
/// At most one committed checkpoint exists per source, and the persisted
/// LSN never decreases across successive commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source_id: Uuid,
    pub lsn: String,
    pub committed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// BufferedEvent
// ---------------------------------------------------------------------------

/// Envelope over [`Event`] as stored in the durable buffer.
///
/// `buffer_id` is assigned by the buffer and is monotonic across appends.
/// `processed_at` transitions exactly once from `None` to `Some`; rows with
/// `processed_at` older than the retention window may be deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedEvent {
    pub buffer_id: i64,
    pub event: Event,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// BufferStats
// ---------------------------------------------------------------------------

/// Point-in-time buffer depth summary for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferStats {
    pub total: u64,
    pub unprocessed: u64,
    pub oldest_unprocessed: Option<DateTime<Utc>>,
    /// Age of the oldest unprocessed event, in whole seconds.
    pub lag_seconds: i64,
}
