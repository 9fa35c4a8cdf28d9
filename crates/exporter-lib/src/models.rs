//! Core data models for the exporter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tenant account polled on every sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Display name, published as the `tenancy` label
    pub name: String,
    pub tenancy_id: String,
    /// Root compartment queried with subtree inclusion
    pub compartment_id: String,
    /// Region code, e.g. `us-ashburn-1`
    pub region: String,
}

/// Contents of `tenants.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenancyConfig {
    #[serde(default)]
    pub tenancies: Vec<Tenant>,
}

/// A metric namespace and the metric names requested from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricNamespace {
    pub namespace: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl MetricNamespace {
    /// Resource group, treating an empty string as absent
    pub fn resource_group(&self) -> Option<&str> {
        self.resource_group.as_deref().filter(|s| !s.is_empty())
    }

    /// Resolution, treating an empty string as absent
    pub fn resolution(&self) -> Option<&str> {
        self.resolution.as_deref().filter(|s| !s.is_empty())
    }
}

/// Contents of `metrics.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricConfig {
    #[serde(default)]
    pub metrics: Vec<MetricNamespace>,
}

/// One aggregated datapoint returned by the monitoring API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One time series in a `SummarizeMetricsData` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    /// Time-ordered, oldest first
    #[serde(default)]
    pub aggregated_datapoints: Vec<Datapoint>,
}

/// A single value extracted from a series
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: String,
    pub dimension_key: String,
    pub dimension_value: String,
    pub value: f64,
}

/// Labels under which one value is published
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelSet {
    pub tenancy: String,
    pub region: String,
    pub namespace: String,
    pub metric: String,
    pub dimension_key: String,
    pub dimension_value: String,
}

impl LabelSet {
    /// Label names in exposition order
    pub const NAMES: [&'static str; 6] = [
        "tenancy",
        "region",
        "namespace",
        "metric",
        "dimension_key",
        "dimension_value",
    ];

    /// Build the label set for a sample collected from `tenant` / `namespace`
    pub fn for_sample(tenant: &Tenant, namespace: &str, sample: &Sample) -> Self {
        Self {
            tenancy: tenant.name.clone(),
            region: tenant.region.clone(),
            namespace: namespace.to_string(),
            metric: sample.metric.clone(),
            dimension_key: sample.dimension_key.clone(),
            dimension_value: sample.dimension_value.clone(),
        }
    }

    /// Label values in the same order as [`LabelSet::NAMES`]
    pub fn values(&self) -> [&str; 6] {
        [
            &self.tenancy,
            &self.region,
            &self.namespace,
            &self.metric,
            &self.dimension_key,
            &self.dimension_value,
        ]
    }
}
