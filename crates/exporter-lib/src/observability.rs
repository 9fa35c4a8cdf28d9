//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Prometheus self-metrics (sweep latency, API calls, retries, failures)
//! - Structured JSON logging with tracing

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Histogram buckets for sweep duration (in seconds)
const SWEEP_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

struct ExporterMetricsInner {
    sweep_duration_seconds: Histogram,
    sweeps_total: IntCounter,
    api_calls_total: IntCounter,
    rate_limit_retries_total: IntCounter,
    query_failures_total: IntCounterVec,
    samples_published_total: IntCounter,
    label_sets: IntGauge,
    last_sweep_timestamp: IntGauge,
}

/// Exporter self-metrics, registered on the same registry as the exported
/// values. Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    inner: Arc<ExporterMetricsInner>,
}

impl ExporterMetrics {
    /// Create and register all self-metrics on `registry`
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let sweep_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "oci_exporter_sweep_duration_seconds",
                "Time spent on one full sweep of all tenants and namespaces",
            )
            .buckets(SWEEP_BUCKETS.to_vec()),
        )?;
        let sweeps_total = IntCounter::new(
            "oci_exporter_sweeps_total",
            "Total number of completed sweeps",
        )?;
        let api_calls_total = IntCounter::new(
            "oci_exporter_api_calls_total",
            "Total number of SummarizeMetricsData calls issued",
        )?;
        let rate_limit_retries_total = IntCounter::new(
            "oci_exporter_rate_limit_retries_total",
            "Total number of calls retried after a rate limit response",
        )?;
        let query_failures_total = IntCounterVec::new(
            Opts::new(
                "oci_exporter_query_failures_total",
                "Total number of failed tenant/namespace queries",
            ),
            &["tenancy", "namespace"],
        )?;
        let samples_published_total = IntCounter::new(
            "oci_exporter_samples_published_total",
            "Total number of samples written to the registry",
        )?;
        let label_sets = IntGauge::new(
            "oci_exporter_label_sets",
            "Number of label sets currently published",
        )?;
        let last_sweep_timestamp = IntGauge::new(
            "oci_exporter_last_sweep_timestamp_seconds",
            "Unix time at which the last sweep completed",
        )?;

        registry.register(Box::new(sweep_duration_seconds.clone()))?;
        registry.register(Box::new(sweeps_total.clone()))?;
        registry.register(Box::new(api_calls_total.clone()))?;
        registry.register(Box::new(rate_limit_retries_total.clone()))?;
        registry.register(Box::new(query_failures_total.clone()))?;
        registry.register(Box::new(samples_published_total.clone()))?;
        registry.register(Box::new(label_sets.clone()))?;
        registry.register(Box::new(last_sweep_timestamp.clone()))?;

        Ok(Self {
            inner: Arc::new(ExporterMetricsInner {
                sweep_duration_seconds,
                sweeps_total,
                api_calls_total,
                rate_limit_retries_total,
                query_failures_total,
                samples_published_total,
                label_sets,
                last_sweep_timestamp,
            }),
        })
    }

    /// Record a completed sweep
    pub fn observe_sweep(&self, duration_secs: f64, label_sets: usize) {
        self.inner.sweep_duration_seconds.observe(duration_secs);
        self.inner.sweeps_total.inc();
        self.inner.label_sets.set(label_sets as i64);
        self.inner
            .last_sweep_timestamp
            .set(chrono::Utc::now().timestamp());
    }

    pub fn inc_api_calls(&self) {
        self.inner.api_calls_total.inc();
    }

    pub fn inc_rate_limit_retries(&self) {
        self.inner.rate_limit_retries_total.inc();
    }

    pub fn inc_query_failures(&self, tenancy: &str, namespace: &str) {
        self.inner
            .query_failures_total
            .with_label_values(&[tenancy, namespace])
            .inc();
    }

    pub fn add_samples_published(&self, count: usize) {
        self.inner.samples_published_total.inc_by(count as u64);
    }

    pub fn api_calls(&self) -> u64 {
        self.inner.api_calls_total.get()
    }

    pub fn rate_limit_retries(&self) -> u64 {
        self.inner.rate_limit_retries_total.get()
    }

    pub fn query_failures(&self, tenancy: &str, namespace: &str) -> u64 {
        self.inner
            .query_failures_total
            .with_label_values(&[tenancy, namespace])
            .get()
    }
}

/// Structured logger for exporter events
///
/// Provides consistent JSON-formatted logging for sweeps, query failures,
/// and process lifecycle.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, tenants: usize, namespaces: usize) {
        info!(
            event = "exporter_started",
            instance = %self.instance,
            exporter_version = %version,
            tenants = tenants,
            namespaces = namespaces,
            "OCI metrics exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            instance = %self.instance,
            reason = %reason,
            "OCI metrics exporter shutting down"
        );
    }

    /// Log the end of a sweep
    pub fn log_sweep(&self, queries: usize, failures: usize, samples: usize, elapsed_ms: u128) {
        if failures > 0 {
            warn!(
                event = "sweep_completed",
                instance = %self.instance,
                queries = queries,
                failures = failures,
                samples = samples,
                elapsed_ms = elapsed_ms,
                "Sweep completed with failures"
            );
        } else {
            info!(
                event = "sweep_completed",
                instance = %self.instance,
                queries = queries,
                failures = failures,
                samples = samples,
                elapsed_ms = elapsed_ms,
                "Sweep completed"
            );
        }
    }

    /// Log a failed tenant/namespace query
    pub fn log_query_failure(&self, tenancy: &str, region: &str, namespace: &str, error: &str) {
        warn!(
            event = "query_failed",
            instance = %self.instance,
            tenancy = %tenancy,
            region = %region,
            namespace = %namespace,
            error = %error,
            "Failed to query metrics"
        );
    }

    /// Log eviction of stale label sets
    pub fn log_eviction(&self, evicted: usize) {
        info!(
            event = "stale_evicted",
            instance = %self.instance,
            evicted = evicted,
            "Evicted stale label sets"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn test_exporter_metrics_registration() {
        let registry = Registry::new();
        let metrics = ExporterMetrics::register(&registry).unwrap();

        metrics.observe_sweep(1.5, 12);
        metrics.inc_api_calls();
        metrics.inc_api_calls();
        metrics.inc_rate_limit_retries();
        metrics.inc_query_failures("prod", "oci_lbaas");
        metrics.add_samples_published(12);

        assert_eq!(metrics.api_calls(), 2);
        assert_eq!(metrics.rate_limit_retries(), 1);
        assert_eq!(metrics.query_failures("prod", "oci_lbaas"), 1);

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("oci_exporter_sweep_duration_seconds_bucket"));
        assert!(text.contains("oci_exporter_label_sets 12"));
        assert!(text.contains("oci_exporter_samples_published_total 12"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        ExporterMetrics::register(&registry).unwrap();
        assert!(ExporterMetrics::register(&registry).is_err());
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("exporter-0");
        assert_eq!(logger.instance, "exporter-0");
    }
}
