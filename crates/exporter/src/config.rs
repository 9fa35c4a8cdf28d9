//! Exporter configuration
//!
//! Paths and the listen address come from the command line. Collection
//! tunables come from `EXPORTER_*` environment variables.

use clap::Parser;
use exporter_lib::query::QueryMode;
use exporter_lib::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command line of the exporter
#[derive(Debug, Clone, Parser)]
#[command(name = "oci-exporter")]
#[command(author, version, about = "Prometheus exporter for OCI Monitoring metrics", long_about = None)]
pub struct Cli {
    /// Path to the OCI API config file
    #[arg(long, env = "OCI_CONFIG_FILE")]
    pub config: PathBuf,

    /// Profile to use from the OCI config file
    #[arg(long, env = "OCI_CLI_PROFILE", default_value = "DEFAULT")]
    pub profile: String,

    /// Address the metrics endpoint listens on
    #[arg(long, env = "EXPORTER_LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub listen_address: SocketAddr,

    /// Tenant catalog
    #[arg(long, default_value = "config/tenants.yaml")]
    pub tenants: PathBuf,

    /// Metric catalog
    #[arg(long, default_value = "config/metrics.yaml")]
    pub metrics: PathBuf,
}

/// Collection tunables
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterSettings {
    /// Instance name used in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Delay between sweeps in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Query lookback window in seconds
    #[serde(default = "default_lookback")]
    pub lookback_secs: u64,

    /// Minimum gap between two outbound calls in milliseconds
    #[serde(default = "default_min_request_spacing")]
    pub min_request_spacing_ms: u64,

    /// Attempts per query when rate limited
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// `grouped` or `per_metric`
    #[serde(default)]
    pub query_mode: QueryMode,

    /// Queries in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Evict label sets not refreshed for this many seconds; unset keeps them forever
    #[serde(default)]
    pub stale_after_secs: Option<u64>,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "oci-exporter".to_string())
}

fn default_interval() -> u64 {
    60
}

fn default_lookback() -> u64 {
    300
}

fn default_min_request_spacing() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_concurrency() -> usize {
    1
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            interval_secs: default_interval(),
            lookback_secs: default_lookback(),
            min_request_spacing_ms: default_min_request_spacing(),
            max_attempts: default_max_attempts(),
            query_mode: QueryMode::default(),
            concurrency: default_concurrency(),
            stale_after_secs: None,
        }
    }
}

impl ExporterSettings {
    /// Load tunables from the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(config::Environment::with_prefix("EXPORTER"))
    }

    fn from_source<S>(source: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings: Self = config::Config::builder()
            .add_source(source)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|source| ConfigError::Load {
                path: "environment".to_string(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            path: "environment".to_string(),
            message: message.to_string(),
        };

        if self.interval_secs == 0 {
            return Err(invalid("EXPORTER_INTERVAL_SECS must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("EXPORTER_MAX_ATTEMPTS must be positive"));
        }
        if self.concurrency == 0 {
            return Err(invalid("EXPORTER_CONCURRENCY must be positive"));
        }
        if self.lookback_secs <= 60 {
            return Err(invalid("EXPORTER_LOOKBACK_SECS must exceed the 60s sampling interval"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }

    pub fn min_request_spacing(&self) -> Duration {
        Duration::from_millis(self.min_request_spacing_ms)
    }

    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_secs.map(Duration::from_secs)
    }
}
