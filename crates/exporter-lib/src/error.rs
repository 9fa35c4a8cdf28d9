//! Error taxonomy for the exporter
//!
//! Startup failures (`ConfigError`, `AuthError`) are fatal. Everything raised
//! while sweeping (`ProviderError`, `QueryError`) is logged and the affected
//! tenant/namespace pair is simply not refreshed.

use thiserror::Error;

/// Catalog or tunable configuration could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: config::ConfigError,
    },

    #[error("invalid configuration in {path}: {message}")]
    Invalid { path: String, message: String },
}

/// Credentials or the provider client could not be set up
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid OCI config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("profile [{0}] not found in OCI config")]
    MissingProfile(String),

    #[error("OCI config profile is missing `{0}`")]
    MissingField(&'static str),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Failure of a single outbound monitoring call
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// HTTP 429 / `TooManyRequests`
    #[error("rate limited by monitoring API: {0}")]
    RateLimited(String),

    #[error("monitoring API returned {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("failed to sign request: {0}")]
    Signing(String),
}

impl ProviderError {
    /// Whether this is a rate-limit class error
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ProviderError::RateLimited(_) => true,
            ProviderError::Status { status, code, .. } => {
                *status == 429 || code == "TooManyRequests"
            }
            _ => false,
        }
    }
}

/// Outcome of a query after retries, as seen by the scheduler
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("still rate limited after {attempts} attempts: {last}")]
    RateLimitExhausted { attempts: u32, last: ProviderError },

    #[error(transparent)]
    Failed(ProviderError),
}

impl From<ProviderError> for QueryError {
    fn from(err: ProviderError) -> Self {
        QueryError::Failed(err)
    }
}
