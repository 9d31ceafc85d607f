//! Repository port for the alerting subsystem.
//!
//! This module defines **only** the contract and its error type. The
//! Postgres adapter lives in `floe-db`; the in-memory double in
//! `floe-testkit`.

use std::fmt;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_schemas::{
    AlertHistoryEntry, AlertInstance, AlertRoute, AlertRule, NotificationChannel, Silence,
};

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors from the alert repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Lookup by id missed. Expected for "does it exist" probes, a genuine
    /// error for direct gets.
    NotFound,
    /// Connection or query failure.
    Backend(String),
    /// Cooperative shutdown observed inside the adapter.
    Cancelled,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "alert store: not found"),
            StoreError::Backend(msg) => write!(f, "alert store backend error: {msg}"),
            StoreError::Cancelled => write!(f, "alert store operation cancelled"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// AlertStore
// ---------------------------------------------------------------------------

/// Persistence contract consumed by [`crate::AlertManager`] and
/// [`crate::Notifier`].
#[async_trait::async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_enabled_rules(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<AlertRule>, StoreError>;

    /// Direct get; a miss is a genuine [`StoreError::NotFound`].
    async fn get_rule(&self, cancel: CancellationToken, id: Uuid) -> Result<AlertRule, StoreError>;

    async fn list_silences(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<Silence>, StoreError>;

    /// The at-most-one firing instance for (rule, fingerprint), if any.
    async fn find_firing(
        &self,
        cancel: CancellationToken,
        rule_id: Uuid,
        fingerprint: &str,
    ) -> Result<Option<AlertInstance>, StoreError>;

    async fn list_firing(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<AlertInstance>, StoreError>;

    async fn insert_instance(
        &self,
        cancel: CancellationToken,
        instance: &AlertInstance,
    ) -> Result<(), StoreError>;

    async fn update_instance(
        &self,
        cancel: CancellationToken,
        instance: &AlertInstance,
    ) -> Result<(), StoreError>;

    /// Append-only history.
    async fn append_history(
        &self,
        cancel: CancellationToken,
        entry: &AlertHistoryEntry,
    ) -> Result<(), StoreError>;

    async fn routes_for_rule(
        &self,
        cancel: CancellationToken,
        rule_id: Uuid,
    ) -> Result<Vec<AlertRoute>, StoreError>;

    async fn get_channel(
        &self,
        cancel: CancellationToken,
        id: Uuid,
    ) -> Result<NotificationChannel, StoreError>;
}
