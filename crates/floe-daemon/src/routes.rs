//! Axum router and HTTP handlers for floe-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and
//! attaches middleware layers. Handlers are `pub(crate)` so tests can
//! compose the router directly.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::state::{uptime_secs, AppState};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the application router wired to the given shared state.
/// Middleware layers (CORS, tracing) are attached by `main.rs` so tests can
/// use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
    version: &'static str,
}

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let mut snap = st.status.read().await.clone();
    snap.daemon_uptime_secs = uptime_secs();
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_ok() {
        let state = Arc::new(AppState::new("deadbeef".to_string(), false));
        let resp = health(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_carries_config_hash() {
        let state = Arc::new(AppState::new("deadbeef".to_string(), true));
        let resp = status_handler(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
