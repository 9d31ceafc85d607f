//! Shared runtime state for floe-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of daemon state, returned by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    /// Short hash of the canonical configuration this process loaded.
    pub config_hash: String,
    /// "running" while the cycle task is alive, "stopped" once it has
    /// exited. The cycle wrapper in `main.rs` writes the terminal value.
    pub alerting: String,
    pub scaling: String,
    pub scaling_dry_run: bool,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub status: Arc<RwLock<StatusSnapshot>>,
}

impl AppState {
    pub fn new(config_hash: String, scaling_dry_run: bool) -> Self {
        Self {
            build: BuildInfo {
                service: "floe-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            status: Arc::new(RwLock::new(StatusSnapshot {
                daemon_uptime_secs: uptime_secs(),
                config_hash,
                alerting: "running".to_string(),
                scaling: "running".to_string(),
                scaling_dry_run,
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
