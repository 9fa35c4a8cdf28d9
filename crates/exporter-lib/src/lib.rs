//! Exporter library for OCI Monitoring metrics
//!
//! This crate provides the core functionality for:
//! - Tenant and metric catalog loading
//! - MQL query construction
//! - Paced, retrying access to the Monitoring API
//! - Mapping of responses to labelled samples
//! - The published metric registry and the sweep loop that fills it
//! - Health checks and observability

pub mod catalog;
pub mod client;
pub mod error;
pub mod health;
pub mod mapper;
pub mod models;
pub mod observability;
pub mod query;
pub mod registry;
pub mod scheduler;

pub use catalog::Catalog;
pub use error::{AuthError, ConfigError, ProviderError, QueryError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use registry::MetricRegistry;
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerConfig, SweepResults};
