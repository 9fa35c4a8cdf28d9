//! Monitoring API access
//!
//! [`MonitoringClient`] is the raw transport. [`RateLimitedClient`] wraps any
//! transport with the shared request pacer and the retry policy, and is what
//! the scheduler talks to.

mod oci;
mod pacer;
mod retry;

pub use oci::{OciClient, OciCredentials, RequestSigner};
pub use pacer::{RequestPacer, DEFAULT_MIN_SPACING};
pub use retry::{RetryFailure, RetryPolicy};

use crate::error::{ProviderError, QueryError};
use crate::models::{Series, Tenant};
use crate::observability::ExporterMetrics;
use crate::query::Query;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Transport for `SummarizeMetricsData`
#[async_trait]
pub trait MonitoringClient: Send + Sync {
    /// Issue one call in `region`; no retries, no pacing
    async fn summarize_metrics_data(
        &self,
        region: &str,
        query: &Query,
    ) -> Result<Vec<Series>, ProviderError>;
}

/// Paced, retrying wrapper around a [`MonitoringClient`]
#[derive(Clone)]
pub struct RateLimitedClient {
    inner: Arc<dyn MonitoringClient>,
    pacer: Arc<RequestPacer>,
    retry: RetryPolicy,
    metrics: Option<ExporterMetrics>,
}

impl RateLimitedClient {
    pub fn new(inner: Arc<dyn MonitoringClient>, pacer: Arc<RequestPacer>, retry: RetryPolicy) -> Self {
        Self {
            inner,
            pacer,
            retry,
            metrics: None,
        }
    }

    /// Record call and retry counts in exporter metrics
    pub fn with_metrics(mut self, metrics: ExporterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `query` for `tenant`, pacing every attempt and retrying rate limits
    pub async fn invoke(&self, tenant: &Tenant, query: &Query) -> Result<Vec<Series>, QueryError> {
        let result = self
            .retry
            .run(
                |attempt| async move {
                    self.pacer.acquire().await;
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_api_calls();
                        if attempt > 0 {
                            metrics.inc_rate_limit_retries();
                        }
                    }
                    debug!(
                        tenancy = %tenant.name,
                        region = %tenant.region,
                        namespace = %query.namespace,
                        attempt = attempt,
                        "Calling SummarizeMetricsData"
                    );
                    self.inner
                        .summarize_metrics_data(&tenant.region, query)
                        .await
                },
                ProviderError::is_rate_limited,
            )
            .await;

        result.map_err(|failure| {
            if failure.exhausted {
                QueryError::RateLimitExhausted {
                    attempts: failure.attempts,
                    last: failure.error,
                }
            } else {
                QueryError::Failed(failure.error)
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport shared by client and scheduler tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted responses per `(region, namespace)`, falling back to
    /// an empty response when a script runs out
    #[derive(Default)]
    pub struct ScriptedClient {
        scripts: Mutex<HashMap<(String, String), Vec<Result<Vec<Series>, ProviderError>>>>,
        pub calls: Mutex<Vec<(String, String, String, Instant)>>,
    }

    impl ScriptedClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(
            &self,
            region: &str,
            namespace: &str,
            mut results: Vec<Result<Vec<Series>, ProviderError>>,
        ) {
            results.reverse();
            self.scripts
                .lock()
                .unwrap()
                .insert((region.to_string(), namespace.to_string()), results);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|c| c.3).collect()
        }
    }

    #[async_trait]
    impl MonitoringClient for ScriptedClient {
        async fn summarize_metrics_data(
            &self,
            region: &str,
            query: &Query,
        ) -> Result<Vec<Series>, ProviderError> {
            self.calls.lock().unwrap().push((
                region.to_string(),
                query.namespace.clone(),
                query.text.clone(),
                Instant::now(),
            ));
            self.scripts
                .lock()
                .unwrap()
                .get_mut(&(region.to_string(), query.namespace.clone()))
                .and_then(|script| script.pop())
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}
