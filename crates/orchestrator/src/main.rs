//! Run Orchestrator - accepts analysis runs and drives them through the
//! compute service
//!
//! Runs as a single process with one in-memory queue worker.

use anyhow::{Context, Result};
use orchestrator_lib::{
    health::{components, HealthRegistry},
    observability::{OrchestratorMetrics, StructuredLogger},
    open_store, HttpComputeClient, Orchestrator, QueueConfig, RunQueue,
};
use run_orchestrator::{api, config::OrchestratorConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long the queue worker gets to record a cancelled run
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting run-orchestrator");

    let config = OrchestratorConfig::load()?;
    info!(
        instance = %config.instance_name,
        store_backend = config.store_backend.as_str(),
        "Orchestrator configured"
    );

    let health_registry = HealthRegistry::for_orchestrator().await;
    let metrics = OrchestratorMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let store = open_store(&config.store_backend())
        .await
        .context("failed to open run store")?;
    let engine = HttpComputeClient::new(config.compute_config())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (queue, worker) = RunQueue::spawn(
        QueueConfig {
            compute_timeout: config.compute_timeout(),
        },
        shutdown_rx.clone(),
    );

    let orchestrator = Orchestrator::builder()
        .store(store)
        .engine(Arc::new(engine))
        .queue(queue)
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    logger.log_startup(
        SERVICE_VERSION,
        config.store_backend.as_str(),
        &config.compute_url,
    );

    let app_state = Arc::new(api::AppState::new(
        orchestrator,
        health_registry.clone(),
        metrics,
    ));

    health_registry.set_ready(true).await;

    let mut server_shutdown = shutdown_rx;
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    }));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(true);

    api_handle.await.context("API server task panicked")??;

    match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, worker).await {
        Ok(_) => {}
        Err(_) => {
            health_registry
                .set_unhealthy(components::QUEUE, "worker did not stop in time")
                .await;
            warn!("Run queue worker did not stop in time");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
