//! Pizzeria backend gateway.
//!
//! Serves assistant replies backed by the LLM provider (through the
//! resilient invoker) and receives provider webhooks behind the inbound gate.

mod assistant;
mod config;
mod error;
mod health;
mod logging;
mod metrics;
mod routes;
mod sink;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing::info;

use crate::config::Config;
use crate::metrics::MetricsRegistry;
use crate::sink::LoggingSink;
use crate::state::{webhooks_state, AppState};

#[tokio::main]
async fn main() {
    // Logging depends on RUST_LOG from the config, so config errors go to stderr
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        service = logging::SERVICE_NAME,
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        llm_configured = config.anthropic_api_key.is_some(),
        cache_enabled = config.cache_enabled,
        "Starting pizzeria-api"
    );
    tracing::debug!(?config, "Loaded configuration");

    let metrics = Arc::new(MetricsRegistry::new());
    let state = match AppState::from_config(&config, Arc::clone(&metrics)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to initialize application state: {e}");
            std::process::exit(1);
        }
    };
    let webhooks = webhooks_state(&config, &metrics, Arc::new(LoggingSink));

    let app = routes::create_router(state, webhooks);

    let addr: SocketAddr = match config.bind_address().parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid bind address '{}': {e}", config.bind_address());
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    info!(%addr, "Server listening");

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
