//! Sweep scheduling loop
//!
//! Runs one full sweep over every tenant and namespace, waits for the
//! configured delay, and repeats until shutdown. A failing tenant/namespace
//! pair is logged and skipped; it never aborts the rest of the sweep.

use crate::catalog::Catalog;
use crate::client::RateLimitedClient;
use crate::error::QueryError;
use crate::health::{components, HealthRegistry};
use crate::mapper;
use crate::models::{LabelSet, MetricNamespace, Tenant};
use crate::observability::{ExporterMetrics, StructuredLogger};
use crate::query::{Query, QueryBuilder};
use crate::registry::MetricRegistry;
use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

/// Configuration for the sweep loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between the end of one sweep and the start of the next (default: 60 seconds)
    pub interval: Duration,
    /// Queries in flight at once; all of them share one request pacer (default: 1)
    pub concurrency: usize,
    /// Evict label sets not refreshed for this long (default: never)
    pub stale_after: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            concurrency: 1,
            stale_after: None,
        }
    }
}

/// Results from one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepResults {
    pub queries: usize,
    pub failures: usize,
    pub samples: usize,
    pub evicted: usize,
}

/// One unit of sweep work
struct Job {
    tenant: Arc<Tenant>,
    namespace: Arc<MetricNamespace>,
    query: Query,
}

/// Drives periodic collection across all tenants and namespaces
pub struct Scheduler {
    catalog: Catalog,
    client: RateLimitedClient,
    queries: QueryBuilder,
    registry: MetricRegistry,
    health: HealthRegistry,
    metrics: Option<ExporterMetrics>,
    logger: StructuredLogger,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Loop until `shutdown` fires. The first sweep starts immediately; a
    /// sweep in progress is always finished.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            tenants = self.catalog.tenants.len(),
            namespaces = self.catalog.namespaces.len(),
            mode = ?self.queries.mode(),
            "Starting sweep loop"
        );
        self.health.register(components::SCHEDULER).await;
        self.health.register(components::MONITORING_CLIENT).await;

        loop {
            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down sweep loop");
                    break;
                }
            }
        }
    }

    /// Build the queries of one sweep, tenants outermost
    fn plan(&self) -> Vec<Job> {
        let now = Utc::now();
        let mut jobs = Vec::new();

        for tenant in &self.catalog.tenants {
            for namespace in &self.catalog.namespaces {
                for query in self.queries.build(tenant, namespace, now) {
                    jobs.push(Job {
                        tenant: tenant.clone(),
                        namespace: namespace.clone(),
                        query,
                    });
                }
            }
        }

        jobs
    }

    /// Run one full sweep
    pub async fn sweep(&self) -> SweepResults {
        let start = Instant::now();
        let jobs = self.plan();
        let mut results = SweepResults {
            queries: jobs.len(),
            ..Default::default()
        };

        // Owned jobs; borrowing them in the closure makes the sweep future non-Send
        let outcomes: Vec<Result<usize, QueryError>> = stream::iter(jobs)
            .map(|job| self.run_job(job))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(samples) => results.samples += samples,
                Err(_) => results.failures += 1,
            }
        }

        if let Some(max_age) = self.config.stale_after {
            results.evicted = self.registry.evict_stale(max_age);
            if results.evicted > 0 {
                self.logger.log_eviction(results.evicted);
            }
        }

        let elapsed = start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.observe_sweep(elapsed.as_secs_f64(), self.registry.len());
            metrics.add_samples_published(results.samples);
        }
        self.logger.log_sweep(
            results.queries,
            results.failures,
            results.samples,
            elapsed.as_millis(),
        );
        self.health
            .record_sweep(results.queries, results.failures)
            .await;

        results
    }

    /// Query, map and publish one tenant/namespace pair
    async fn run_job(&self, job: Job) -> Result<usize, QueryError> {
        let series = match self.client.invoke(&job.tenant, &job.query).await {
            Ok(series) => series,
            Err(e) => {
                self.logger.log_query_failure(
                    &job.tenant.name,
                    &job.tenant.region,
                    &job.namespace.namespace,
                    &e.to_string(),
                );
                if let Some(metrics) = &self.metrics {
                    metrics.inc_query_failures(&job.tenant.name, &job.namespace.namespace);
                }
                return Err(e);
            }
        };

        let samples = mapper::map(&series, &job.query);
        for sample in &samples {
            let labels = LabelSet::for_sample(&job.tenant, &job.namespace.namespace, sample);
            self.registry.set(&labels, sample.value);
        }

        debug!(
            tenancy = %job.tenant.name,
            namespace = %job.namespace.namespace,
            series = series.len(),
            samples = samples.len(),
            "Published samples"
        );
        Ok(samples.len())
    }
}

/// Builder for creating the scheduler
pub struct SchedulerBuilder {
    catalog: Option<Catalog>,
    client: Option<RateLimitedClient>,
    registry: Option<MetricRegistry>,
    queries: QueryBuilder,
    health: Option<HealthRegistry>,
    metrics: Option<ExporterMetrics>,
    logger: Option<StructuredLogger>,
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            catalog: None,
            client: None,
            registry: None,
            queries: QueryBuilder::default(),
            health: None,
            metrics: None,
            logger: None,
            config: SchedulerConfig::default(),
        }
    }

    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn client(mut self, client: RateLimitedClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn registry(mut self, registry: MetricRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn query_builder(mut self, queries: QueryBuilder) -> Self {
        self.queries = queries;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metrics(mut self, metrics: ExporterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn stale_after(mut self, stale_after: Option<Duration>) -> Self {
        self.config.stale_after = stale_after;
        self
    }

    pub fn build(self) -> Result<Scheduler> {
        let catalog = self
            .catalog
            .ok_or_else(|| anyhow::anyhow!("Catalog is required"))?;
        let client = self
            .client
            .ok_or_else(|| anyhow::anyhow!("Client is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("Registry is required"))?;

        Ok(Scheduler {
            catalog,
            client,
            queries: self.queries,
            registry,
            health: self.health.unwrap_or_default(),
            metrics: self.metrics,
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("oci-exporter")),
            config: self.config,
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
