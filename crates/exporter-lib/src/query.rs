//! Query construction
//!
//! Every requested metric `m` becomes the MQL term `m[1m].mean()`. In
//! [`QueryMode::Grouped`] all terms of a namespace are comma-joined into one
//! expression, so a sweep costs one call per tenant and namespace. In
//! [`QueryMode::PerMetric`] each term is its own call, so a sweep costs one
//! call per tenant and metric name.

use crate::error::ConfigError;
use crate::models::{MetricNamespace, Tenant};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Sampling interval used inside every query term
pub const SAMPLING_INTERVAL: Duration = Duration::from_secs(60);

/// Default lookback window, wide enough to absorb ingestion lag
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(5 * 60);

/// How metric names of a namespace are spread over provider calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// One call per namespace
    #[default]
    Grouped,
    /// One call per metric name
    PerMetric,
}

/// One `SummarizeMetricsData` request, built fresh each sweep
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub namespace: String,
    pub text: String,
    /// Metric names covered by `text`, in request order
    pub metric_names: Vec<String>,
    pub compartment_id: String,
    pub include_subtree: bool,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resource_group: Option<String>,
    pub resolution: Option<String>,
}

/// MQL term for a single metric
pub fn metric_term(name: &str) -> String {
    format!("{}[1m].mean()", name)
}

/// Build query expressions for a list of metric names.
///
/// Returns an empty list when `names` is empty.
pub fn build(names: &[String], mode: QueryMode) -> Vec<(String, Vec<String>)> {
    if names.is_empty() {
        return Vec::new();
    }

    match mode {
        QueryMode::Grouped => {
            let text = names
                .iter()
                .map(|n| metric_term(n))
                .collect::<Vec<_>>()
                .join(",");
            vec![(text, names.to_vec())]
        }
        QueryMode::PerMetric => names
            .iter()
            .map(|n| (metric_term(n), vec![n.clone()]))
            .collect(),
    }
}

/// Builds provider queries for tenant/namespace pairs
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    mode: QueryMode,
    lookback: Duration,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            mode: QueryMode::Grouped,
            lookback: DEFAULT_LOOKBACK,
        }
    }
}

impl QueryBuilder {
    /// Create a builder; the lookback must exceed [`SAMPLING_INTERVAL`]
    pub fn new(mode: QueryMode, lookback: Duration) -> Result<Self, ConfigError> {
        if lookback <= SAMPLING_INTERVAL {
            return Err(ConfigError::Invalid {
                path: "lookback".to_string(),
                message: format!(
                    "lookback of {}s must exceed the {}s sampling interval",
                    lookback.as_secs(),
                    SAMPLING_INTERVAL.as_secs()
                ),
            });
        }
        Ok(Self { mode, lookback })
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Query window `[now - lookback, now)`
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let lookback = ChronoDuration::from_std(self.lookback)
            .unwrap_or_else(|_| ChronoDuration::minutes(5));
        (now - lookback, now)
    }

    /// Build all queries for one tenant and namespace at time `now`
    pub fn build(
        &self,
        tenant: &Tenant,
        namespace: &MetricNamespace,
        now: DateTime<Utc>,
    ) -> Vec<Query> {
        let (start, end) = self.window(now);

        build(&namespace.names, self.mode)
            .into_iter()
            .map(|(text, metric_names)| Query {
                namespace: namespace.namespace.clone(),
                text,
                metric_names,
                compartment_id: tenant.compartment_id.clone(),
                include_subtree: true,
                start,
                end,
                resource_group: namespace.resource_group().map(str::to_string),
                resolution: namespace.resolution().map(str::to_string),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn tenant() -> Tenant {
        Tenant {
            name: "prod".into(),
            tenancy_id: "ocid1.tenancy.oc1..aaaa".into(),
            compartment_id: "ocid1.compartment.oc1..bbbb".into(),
            region: "eu-frankfurt-1".into(),
        }
    }

    #[test]
    fn test_grouped_mode_joins_terms() {
        let queries = build(&names(&["CpuUtilization", "MemoryUtilization"]), QueryMode::Grouped);
        assert_eq!(queries.len(), 1);
        assert_eq!(
            queries[0].0,
            "CpuUtilization[1m].mean(),MemoryUtilization[1m].mean()"
        );
        assert_eq!(queries[0].1.len(), 2);
    }

    #[test]
    fn test_per_metric_mode_one_query_per_name() {
        let queries = build(&names(&["A", "B", "C"]), QueryMode::PerMetric);
        let texts: Vec<_> = queries.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["A[1m].mean()", "B[1m].mean()", "C[1m].mean()"]);
        assert_eq!(queries[1].1, vec!["B".to_string()]);
    }

    #[test]
    fn test_one_term_per_entry_including_duplicates() {
        for mode in [QueryMode::Grouped, QueryMode::PerMetric] {
            let requested = names(&["A", "A", "B"]);
            let queries = build(&requested, mode);
            let terms: usize = queries
                .iter()
                .map(|(text, _)| text.matches("[1m].mean()").count())
                .sum();
            assert_eq!(terms, requested.len(), "mode {:?}", mode);
            assert!(queries.iter().all(|(text, _)| !text.is_empty()));
        }
    }

    #[test]
    fn test_empty_names_yield_no_query() {
        assert!(build(&[], QueryMode::Grouped).is_empty());
        assert!(build(&[], QueryMode::PerMetric).is_empty());
    }

    #[test]
    fn test_builder_sets_scope_window_and_modifiers() {
        let builder = QueryBuilder::default();
        let ns = MetricNamespace {
            namespace: "oci_lbaas".into(),
            names: names(&["HttpRequests"]),
            resource_group: Some("frontend".into()),
            resolution: Some(String::new()),
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let queries = builder.build(&tenant(), &ns, now);

        assert_eq!(queries.len(), 1);
        let q = &queries[0];
        assert_eq!(q.namespace, "oci_lbaas");
        assert_eq!(q.compartment_id, "ocid1.compartment.oc1..bbbb");
        assert!(q.include_subtree);
        assert_eq!(q.end, now);
        assert_eq!(q.start, Utc.with_ymd_and_hms(2024, 3, 1, 11, 55, 0).unwrap());
        assert_eq!(q.resource_group.as_deref(), Some("frontend"));
        assert_eq!(q.resolution, None);
    }

    #[test]
    fn test_lookback_must_exceed_sampling_interval() {
        assert!(matches!(
            QueryBuilder::new(QueryMode::Grouped, Duration::from_secs(60)),
            Err(ConfigError::Invalid { ref message, .. }) if message.contains("60s")
        ));
        assert!(QueryBuilder::new(QueryMode::PerMetric, Duration::from_secs(120)).is_ok());
    }
}
