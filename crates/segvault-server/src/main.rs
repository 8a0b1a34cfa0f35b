//! segvault-server entry point.
//!
//! Loads configuration, initialises logging and serves the key endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use segvault_server::{
    build_service, init_logging, router, spawn_session_sweeper, AppState, ServerConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = ServerConfig::path_from_env();
    let config = ServerConfig::load(&config_path)?;

    init_logging(&config.logging.level, &config.logging.format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "segvault server starting"
    );

    let service = Arc::new(build_service(&config).await?);
    let sweeper = spawn_session_sweeper(
        service.clone(),
        Duration::from_secs(config.server.sweep_interval_secs.max(1)),
    );

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("cannot bind {address}"))?;
    info!(address = %address, "listening");

    axum::serve(listener, router(AppState::new(service)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("segvault server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
