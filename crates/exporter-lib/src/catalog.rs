//! Tenant and metric catalogs
//!
//! Both catalogs are YAML files read once at startup and never mutated. Any
//! problem here is a [`ConfigError`] and stops the process.

use crate::error::ConfigError;
use crate::models::{MetricConfig, MetricNamespace, TenancyConfig, Tenant};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Validated, immutable view of both catalogs
#[derive(Debug, Clone)]
pub struct Catalog {
    pub tenants: Vec<Arc<Tenant>>,
    pub namespaces: Vec<Arc<MetricNamespace>>,
}

impl Catalog {
    /// Load and validate `tenants.yaml` and `metrics.yaml`
    pub fn load(tenants_path: &Path, metrics_path: &Path) -> Result<Self, ConfigError> {
        let tenants: TenancyConfig = read_yaml(tenants_path)?;
        let metrics: MetricConfig = read_yaml(metrics_path)?;

        let catalog = Self::from_parts(tenants, metrics).map_err(|e| match e {
            ConfigError::Invalid { message, .. } => ConfigError::Invalid {
                path: format!("{} / {}", tenants_path.display(), metrics_path.display()),
                message,
            },
            other => other,
        })?;

        info!(
            tenants = catalog.tenants.len(),
            namespaces = catalog.namespaces.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    /// Validate already-parsed catalogs
    pub fn from_parts(tenants: TenancyConfig, metrics: MetricConfig) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            path: "catalog".to_string(),
            message,
        };

        if tenants.tenancies.is_empty() {
            return Err(invalid("no tenancies configured".to_string()));
        }
        for (i, tenant) in tenants.tenancies.iter().enumerate() {
            for (field, value) in [
                ("name", &tenant.name),
                ("tenancy_id", &tenant.tenancy_id),
                ("compartment_id", &tenant.compartment_id),
                ("region", &tenant.region),
            ] {
                if value.trim().is_empty() {
                    return Err(invalid(format!("tenancies[{}] has an empty `{}`", i, field)));
                }
            }
        }

        if metrics.metrics.is_empty() {
            return Err(invalid("no metric namespaces configured".to_string()));
        }
        for (i, ns) in metrics.metrics.iter().enumerate() {
            if ns.namespace.trim().is_empty() {
                return Err(invalid(format!("metrics[{}] has an empty `namespace`", i)));
            }
            if ns.names.iter().any(|n| n.trim().is_empty()) {
                return Err(invalid(format!(
                    "metrics[{}] ({}) lists an empty metric name",
                    i, ns.namespace
                )));
            }
            if ns.names.is_empty() {
                warn!(namespace = %ns.namespace, "Namespace has no metric names and will be skipped");
            }
        }

        Ok(Self {
            tenants: tenants.tenancies.into_iter().map(Arc::new).collect(),
            namespaces: metrics.metrics.into_iter().map(Arc::new).collect(),
        })
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let display = path.display().to_string();
    config::Config::builder()
        .add_source(config::File::new(&display, config::FileFormat::Yaml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|source| ConfigError::Load {
            path: display,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const TENANTS: &str = r#"
tenancies:
  - name: prod
    tenancy_id: ocid1.tenancy.oc1..aaaa
    compartment_id: ocid1.compartment.oc1..bbbb
    region: us-ashburn-1
"#;

    const METRICS: &str = r#"
metrics:
  - namespace: oci_computeagent
    names: [CpuUtilization, MemoryUtilization]
  - namespace: oci_lbaas
    names: [HttpRequests]
    resource_group: frontend
    resolution: 5m
"#;

    #[test]
    fn test_load_catalog_from_yaml() {
        let tenants = yaml_file(TENANTS);
        let metrics = yaml_file(METRICS);

        let catalog = Catalog::load(tenants.path(), metrics.path()).unwrap();

        assert_eq!(catalog.tenants.len(), 1);
        assert_eq!(catalog.tenants[0].name, "prod");
        assert_eq!(catalog.tenants[0].region, "us-ashburn-1");
        assert_eq!(catalog.namespaces.len(), 2);
        assert_eq!(
            catalog.namespaces[0].names,
            vec!["CpuUtilization", "MemoryUtilization"]
        );
        assert_eq!(catalog.namespaces[0].resource_group(), None);
        assert_eq!(catalog.namespaces[1].resource_group(), Some("frontend"));
        assert_eq!(catalog.namespaces[1].resolution(), Some("5m"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let metrics = yaml_file(METRICS);
        let result = Catalog::load(Path::new("/nonexistent/tenants.yaml"), metrics.path());
        assert!(matches!(result, Err(ConfigError::Load { .. })));
    }

    #[test]
    fn test_empty_tenants_rejected() {
        let tenants = yaml_file("tenancies: []\n");
        let metrics = yaml_file(METRICS);
        let result = Catalog::load(tenants.path(), metrics.path());
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_blank_tenant_field_rejected() {
        let tenants = TenancyConfig {
            tenancies: vec![Tenant {
                name: "prod".into(),
                tenancy_id: "ocid1.tenancy".into(),
                compartment_id: " ".into(),
                region: "us-phoenix-1".into(),
            }],
        };
        let metrics = MetricConfig {
            metrics: vec![MetricNamespace {
                namespace: "oci_computeagent".into(),
                names: vec!["CpuUtilization".into()],
                resource_group: None,
                resolution: None,
            }],
        };

        let err = Catalog::from_parts(tenants, metrics).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref path, ref message } if path == "catalog" && message.contains("compartment_id"))
        );
    }

    #[test]
    fn test_namespace_without_names_is_accepted() {
        let tenants = yaml_file(TENANTS);
        let metrics = yaml_file("metrics:\n  - namespace: oci_objectstorage\n    names: []\n");

        let catalog = Catalog::load(tenants.path(), metrics.path()).unwrap();
        assert!(catalog.namespaces[0].names.is_empty());
    }
}
