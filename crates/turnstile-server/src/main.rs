//! # turnstile-server
//!
//! HTTP server for the turnstile facility access system.
//!
//! This binary provides:
//! - REST API for access codes, check-ins, presence, and the directory feed
//! - Background expiry and auto-rotation of access codes
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package turnstile-server
//!
//! # Production
//! TURNSTILE_CONFIG=/etc/turnstile/config.toml ./turnstile-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use turnstile_core::{AccessService, Config};
use turnstile_server::{api, logging, state::AppState};

/// Environment variable overriding the config file location.
const CONFIG_ENV: &str = "TURNSTILE_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_ENV).map_or_else(Config::default_path, PathBuf::from);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    logging::init(config.server.production)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting turnstile-server"
    );

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .context("Invalid server.bind_address")?;

    let service = AccessService::open(config).context("Failed to open access service")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Arc::new(service.sweeper());
    let schedule = service.sweep_schedule();
    let (expire_task, rotate_task) = sweeper.spawn(schedule, shutdown_rx);
    info!(
        expire_every_secs = schedule.expire_interval.as_secs(),
        rotate_every_secs = schedule.rotate_interval.as_secs(),
        "Sweeper started"
    );

    let app = api::create_router(AppState::shared(service));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(expire_task, rotate_task);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
