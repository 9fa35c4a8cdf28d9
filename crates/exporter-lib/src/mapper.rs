//! Mapping of query responses to samples
//!
//! Only the most recent datapoint of each series is kept. Series without
//! datapoints are skipped, which is normal for idle resources.

use crate::models::{Sample, Series};
use crate::query::Query;
use tracing::debug;

/// Preferred dimension identifying a monitored resource
pub const RESOURCE_ID: &str = "resourceId";

/// Pick the dimension used to label a series.
///
/// `resourceId` wins when non-empty. Otherwise the first non-empty pair in
/// key order is used, and `("resourceId", "")` when nothing is set.
pub fn select_dimension(series: &Series) -> (String, String) {
    if let Some(value) = series.dimensions.get(RESOURCE_ID).filter(|v| !v.is_empty()) {
        return (RESOURCE_ID.to_string(), value.clone());
    }

    series
        .dimensions
        .iter()
        .find(|(k, v)| !k.is_empty() && !v.is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .unwrap_or_else(|| (RESOURCE_ID.to_string(), String::new()))
}

/// Map one series to a sample, if it has data
pub fn map_series(series: &Series, query: &Query) -> Option<Sample> {
    let latest = series.aggregated_datapoints.last()?;

    let metric = match series.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        // `metric_names` are the names `query::build` packed into this query:
        // one per query in per-metric mode, every name of the namespace when
        // grouped. Only a single name identifies an unnamed series.
        None => match query.metric_names.as_slice() {
            [only] => only.clone(),
            _ => {
                debug!(
                    namespace = %query.namespace,
                    query = %query.text,
                    "Series without a name in a multi-metric query, skipping"
                );
                return None;
            }
        },
    };

    let (dimension_key, dimension_value) = select_dimension(series);

    Some(Sample {
        metric,
        dimension_key,
        dimension_value,
        value: latest.value,
    })
}

/// Map a full response
pub fn map(response: &[Series], query: &Query) -> Vec<Sample> {
    response
        .iter()
        .filter_map(|series| map_series(series, query))
        .collect()
}
