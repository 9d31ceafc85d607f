//! floe-daemon entry point.
//!
//! This file is intentionally thin: it loads configuration, sets up
//! tracing, connects the repository, wires the alert manager, scaling
//! engine, and buffer janitor onto one root cancellation token, and starts
//! the HTTP server. Route handlers live in `routes.rs`; shared state in
//! `state.rs`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use floe_alerting::{default_channel_factory, AlertManager, AlertManagerConfig};
use floe_config::FloeConfig;
use floe_daemon::{routes, state};
use floe_metrics::PromClient;
use floe_pipeline::run_buffer_janitor;
use floe_scaling::{LogExecutor, ScalingEngine, ScalingEngineConfig};
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

/// Bounded wait for cycles to drain after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file
    // does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    // Configuration: FLOE_CONFIG is a comma-separated list of YAML layers.
    let config_paths = std::env::var("FLOE_CONFIG").unwrap_or_else(|_| "floe.yaml".to_string());
    let paths: Vec<&str> = config_paths.split(',').map(str::trim).collect();
    let config = FloeConfig::load(&paths).context("failed to load configuration")?;
    let settings = config.settings.clone();
    info!(config_hash = %config.hash, "configuration loaded");

    let pool = floe_db::connect_from_env().await?;
    floe_db::migrate(&pool).await?;

    let metrics = Arc::new(PromClient::new(settings.metrics.prometheus_url.clone()));
    let root = CancellationToken::new();

    // Shared state is built before the cycles so each cycle wrapper can
    // flip its status field when it exits.
    let shared = Arc::new(state::AppState::new(
        config.hash.clone(),
        settings.scaling.dry_run,
    ));

    // Alert manager cycle.
    let alert_manager = Arc::new(AlertManager::new(
        Arc::new(floe_db::PgAlertStore::new(pool.clone())),
        metrics.clone(),
        default_channel_factory(),
        AlertManagerConfig {
            evaluation_interval: Duration::from_secs(
                settings.alerting.evaluation_interval_seconds,
            ),
            notification_timeout: Duration::from_secs(
                settings.alerting.notification_timeout_seconds,
            ),
        },
    ));
    let alert_handle = {
        let manager = alert_manager.clone();
        let token = root.child_token();
        let status = Arc::clone(&shared.status);
        tokio::spawn(async move {
            manager.run(token).await;
            status.write().await.alerting = "stopped".to_string();
        })
    };

    // Scaling engine cycle.
    let scaling_engine = Arc::new(ScalingEngine::new(
        Arc::new(floe_db::PgScalingStore::new(pool.clone())),
        Arc::new(LogExecutor::new()),
        metrics.clone(),
        ScalingEngineConfig {
            evaluation_interval: Duration::from_secs(settings.scaling.evaluation_interval_seconds),
            default_cooldown_seconds: settings.scaling.default_cooldown_seconds,
            dry_run: settings.scaling.dry_run,
        },
    ));
    let scaling_handle = {
        let engine = scaling_engine.clone();
        let token = root.child_token();
        let status = Arc::clone(&shared.status);
        tokio::spawn(async move {
            engine.run(token).await;
            status.write().await.scaling = "stopped".to_string();
        })
    };

    // Buffer retention janitor.
    let janitor_handle = {
        let buffer = Arc::new(floe_db::PgBuffer::new(pool.clone()));
        let retention = Duration::from_secs(settings.cdc.buffer_retention_seconds);
        let token = root.child_token();
        tokio::spawn(async move {
            run_buffer_janitor(buffer, retention, Duration::from_secs(300), token).await
        })
    };

    // HTTP surface.
    let app = routes::build_router(Arc::clone(&shared)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr: SocketAddr = settings
        .daemon
        .bind_addr
        .parse()
        .with_context(|| format!("invalid daemon.bind_addr '{}'", settings.daemon.bind_addr))?;
    info!("floe-daemon listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let token = root.clone();
        async move { token.cancelled().await }
    });

    // Root cancellation on ctrl-c.
    {
        let token = root.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                token.cancel();
            }
        });
    }

    server.await.context("server crashed")?;

    // Bounded wait for the cycles to drain.
    for (name, handle) in [
        ("alerting", alert_handle),
        ("scaling", scaling_handle),
        ("janitor", janitor_handle),
    ] {
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            warn!(cycle = name, "cycle did not stop within the grace period");
        }
    }

    info!("floe-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
