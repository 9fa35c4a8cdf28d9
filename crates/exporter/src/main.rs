//! OCI Exporter - Prometheus exporter for OCI Monitoring metrics
//!
//! Periodically queries the Monitoring service for every configured tenancy
//! and namespace and serves the latest values on `/metrics`.

use anyhow::{Context, Result};
use clap::Parser;
use exporter_lib::{
    client::{OciClient, RateLimitedClient, RequestPacer, RetryPolicy},
    health::HealthRegistry,
    observability::{ExporterMetrics, StructuredLogger},
    query::QueryBuilder,
    Catalog, MetricRegistry, SchedulerBuilder,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = config::Cli::parse();
    let settings = config::ExporterSettings::load()?;
    info!(
        instance = %settings.instance_name,
        listen_address = %cli.listen_address,
        "Exporter configured"
    );

    // Catalogs and credentials are required; fail before serving anything
    let catalog = Catalog::load(&cli.tenants, &cli.metrics)?;
    let oci = OciClient::from_config_file(&cli.config, &cli.profile)
        .with_context(|| format!("failed to initialize OCI client from {}", cli.config.display()))?;

    // Initialize metrics
    let registry = MetricRegistry::new()?;
    let metrics = ExporterMetrics::register(registry.registry())?;

    // Initialize structured logger
    let logger = StructuredLogger::new(&settings.instance_name);
    logger.log_startup(EXPORTER_VERSION, catalog.tenants.len(), catalog.namespaces.len());

    let client = RateLimitedClient::new(
        Arc::new(oci),
        Arc::new(RequestPacer::new(settings.min_request_spacing())),
        RetryPolicy::new(settings.max_attempts, Duration::from_secs(1)),
    )
    .with_metrics(metrics.clone());

    let queries = QueryBuilder::new(settings.query_mode, settings.lookback())?;

    let health_registry = HealthRegistry::new();

    let scheduler = SchedulerBuilder::new()
        .catalog(catalog)
        .client(client)
        .registry(registry.clone())
        .query_builder(queries)
        .health(health_registry.clone())
        .metrics(metrics)
        .logger(logger.clone())
        .interval(settings.interval())
        .concurrency(settings.concurrency)
        .stale_after(settings.stale_after())
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry, registry));
    let api_handle = tokio::spawn(api::serve(cli.listen_address, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                }
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Sweep loop task failed");
    }

    info!("Shutting down");
    Ok(())
}
