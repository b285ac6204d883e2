//! `Trustgate` server entry point.
//!
//! Hardens the process, loads configuration, builds the shared state over
//! the in-memory identity store, then serves the Axum router with graceful
//! shutdown on SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use trustgate_storage::{MemoryBackend, StorageBackend};

use trustgate_server::config::ServerConfig;
use trustgate_server::hardening;
use trustgate_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Hardening runs before logging is initialized, so warnings go to
    // stderr. Core dumps are off before any secret is read.
    disable_core_dumps();

    // A missing secret is fatal. Nothing is served without both keys.
    let config = ServerConfig::from_env().context("refusing to start")?;
    lock_memory(&config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(share_links = config.allow_share_links, "Trustgate starting");

    info!("using in-memory identity store (data will not persist)");
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let state = Arc::new(AppState::new(&config, storage));
    let app = trustgate_server::build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "Trustgate server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Trustgate server stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}

#[allow(clippy::print_stderr)]
fn disable_core_dumps() {
    if let Err(e) = hardening::disable_core_dumps() {
        eprintln!("WARNING: failed to disable core dumps: {e}");
    }
}

#[allow(clippy::print_stderr)]
fn lock_memory(config: &ServerConfig) {
    if config.disable_mlock {
        eprintln!("WARNING: mlock disabled via TRUSTGATE_DISABLE_MLOCK, secrets may be swapped to disk");
    } else if let Err(e) = hardening::lock_memory() {
        eprintln!("WARNING: failed to lock memory: {e} (set TRUSTGATE_DISABLE_MLOCK=true for dev)");
    }
}
