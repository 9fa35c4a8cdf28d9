//! Published metric state
//!
//! An owned Prometheus registry holding the `oci_metric_value` gauge family.
//! The scheduler writes into it and the HTTP layer encodes it on scrape; both
//! hold a clone of the same [`MetricRegistry`].

use crate::models::LabelSet;
use dashmap::DashMap;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Name of the exported gauge family
pub const METRIC_NAME: &str = "oci_metric_value";

struct Inner {
    registry: Registry,
    values: GaugeVec,
    updated: DashMap<LabelSet, Instant>,
}

/// Label set to last observed value
#[derive(Clone)]
pub struct MetricRegistry {
    inner: Arc<Inner>,
}

impl MetricRegistry {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let values = GaugeVec::new(
            Opts::new(METRIC_NAME, "OCI Monitoring metric value"),
            &LabelSet::NAMES,
        )?;
        registry.register(Box::new(values.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                values,
                updated: DashMap::new(),
            }),
        })
    }

    /// Underlying registry, for registering exporter self-metrics
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Create or overwrite the value for `labels`
    pub fn set(&self, labels: &LabelSet, value: f64) {
        self.inner
            .values
            .with_label_values(&labels.values())
            .set(value);
        self.inner.updated.insert(labels.clone(), Instant::now());
    }

    /// Current value for `labels`, if published
    pub fn get(&self, labels: &LabelSet) -> Option<f64> {
        if !self.inner.updated.contains_key(labels) {
            return None;
        }
        self.inner
            .values
            .get_metric_with_label_values(&labels.values())
            .ok()
            .map(|g| g.get())
    }

    /// Number of published label sets
    pub fn len(&self) -> usize {
        self.inner.updated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.updated.is_empty()
    }

    /// All published label sets with their values, sorted by labels
    pub fn snapshot(&self) -> Vec<(LabelSet, f64)> {
        let keys: Vec<LabelSet> = self
            .inner
            .updated
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut entries: Vec<(LabelSet, f64)> = keys
            .into_iter()
            .filter_map(|labels| {
                let value = self
                    .inner
                    .values
                    .get_metric_with_label_values(&labels.values())
                    .ok()?
                    .get();
                Some((labels, value))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Drop label sets not refreshed within `max_age`; returns how many
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let stale: Vec<LabelSet> = self
            .inner
            .updated
            .iter()
            .filter(|entry| entry.value().elapsed() > max_age)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for labels in stale {
            if self
                .inner
                .updated
                .remove_if(&labels, |_, at| at.elapsed() > max_age)
                .is_some()
            {
                let _ = self.inner.values.remove_label_values(&labels.values());
                evicted += 1;
            }
        }
        evicted
    }

    /// Text exposition of every family in the registry
    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
