mod app;
mod cli;
mod error;
mod handlers;
mod model;
mod session;
mod state;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use linkhop_registry::{DeletionPipeline, IdentityResolver, Registry, SessionSigner};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::app::App;
use crate::cli::CLI;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    telemetry::init(&config.log_level, config.log_json)?;

    let backend_config = config.backend_config();
    let backend = backend_config
        .connect()
        .await
        .with_context(|| format!("failed to open {} backend", backend_config.kind()))?;

    let registry = Registry::with_defaults(backend.clone());
    registry.restore().await.context("failed to restore links")?;

    let signer = SessionSigner::new(config.session_secret().as_bytes());
    let identity = IdentityResolver::new(backend, signer);
    let pipeline = DeletionPipeline::spawn(
        config.deletion_queue_capacity,
        registry.clone(),
        identity.clone(),
    );

    let state = AppState::new(
        registry.clone(),
        identity,
        pipeline.queue(),
        config.base_url.clone(),
    );

    let listener = TcpListener::bind(&config.server_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server_address))?;
    info!(
        listen_addr = %listener.local_addr()?,
        base_url = %config.base_url,
        backend = backend_config.kind(),
        "starting gateway server"
    );

    axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("draining deletion queue");
    pipeline.shutdown().await;
    registry.close().await.context("failed to close backend")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
