//! lumen-bridge server entry point.
//!
//! Starts the Axum HTTP server with the device WebSocket endpoint, the
//! admin API, and the liveness sweeper.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use lumen_bridge::app_state::AppState;
use lumen_bridge::build_app;
use lumen_bridge::config::BridgeConfig;
use lumen_bridge::session::spawn_sweeper;
use lumen_bridge::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = BridgeConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        addr = %config.listen_addr,
        format = %config.outbound_format,
        sweep_secs = config.sweep_interval.as_secs(),
        "starting lumen-bridge"
    );

    // Build application state
    let listen_addr = config.listen_addr;
    let sweep_interval = config.sweep_interval;
    let store = Arc::new(MemoryStore::new());
    let app_state = AppState::new(config, store);

    // Liveness sweeper
    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        Arc::clone(&app_state.registry),
        sweep_interval,
        shutdown.clone(),
    );

    // Start server
    let app = build_app(app_state);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    shutdown.cancel();
    let _ = sweeper.await;
    tracing::info!("lumen-bridge stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
