//! HTTPS transport for the OCI Monitoring API
//!
//! Requests are signed with the OCI HTTP signature scheme (RSA-SHA256 over
//! the date, request target, host and body headers). Credentials come from a
//! standard OCI API config file.

use super::MonitoringClient;
use crate::error::{AuthError, ProviderError};
use crate::models::Series;
use crate::query::Query;
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

const API_VERSION: &str = "20180401";
const SIGNED_HEADERS: &str = "date (request-target) host content-length content-type x-content-sha256";
const DEFAULT_ENDPOINT: &str = "https://telemetry.{region}.oraclecloud.com";

/// One profile of an OCI API config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciCredentials {
    pub user: String,
    pub tenancy: String,
    pub fingerprint: String,
    pub key_file: PathBuf,
    pub region: Option<String>,
}

impl OciCredentials {
    /// Read `profile` from an OCI config file (`~/.oci/config` layout)
    pub fn from_file(path: &Path, profile: &str) -> Result<Self, AuthError> {
        let display = path.display().to_string();
        let sections: HashMap<String, HashMap<String, String>> = config::Config::builder()
            .add_source(config::File::new(&display, config::FileFormat::Ini))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AuthError::Parse {
                path: display.clone(),
                message: e.to_string(),
            })?;

        let section = sections
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(profile))
            .map(|(_, values)| values)
            .ok_or_else(|| AuthError::MissingProfile(profile.to_string()))?;

        let field = |name: &'static str| {
            section
                .get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(AuthError::MissingField(name))
        };

        let key_file = expand_home(&field("key_file")?);
        let key_file = match (key_file.is_relative(), path.parent()) {
            (true, Some(dir)) => dir.join(key_file),
            _ => key_file,
        };

        Ok(Self {
            user: field("user")?,
            tenancy: field("tenancy")?,
            fingerprint: field("fingerprint")?,
            key_file,
            region: field("region").ok(),
        })
    }

    /// `keyId` used in the signature header
    pub fn key_id(&self) -> String {
        format!("{}/{}/{}", self.tenancy, self.user, self.fingerprint)
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Signs requests with the OCI HTTP signature scheme
#[derive(Clone)]
pub struct RequestSigner {
    key_id: String,
    key: EncodingKey,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// Build a signer from a PEM encoded RSA private key
    pub fn from_pem(key_id: impl Into<String>, pem: &[u8]) -> Result<Self, AuthError> {
        let key = EncodingKey::from_rsa_pem(pem).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(Self {
            key_id: key_id.into(),
            key,
        })
    }

    /// Load the private key referenced by `credentials`
    pub fn from_credentials(credentials: &OciCredentials) -> Result<Self, AuthError> {
        let pem = std::fs::read(&credentials.key_file).map_err(|source| AuthError::Io {
            path: credentials.key_file.display().to_string(),
            source,
        })?;
        Self::from_pem(credentials.key_id(), &pem)
    }

    /// Headers to attach to a POST with a JSON body, `authorization` included
    pub fn sign_post(
        &self,
        url: &Url,
        body: &[u8],
        date: DateTime<Utc>,
    ) -> Result<Vec<(&'static str, String)>, ProviderError> {
        let host = match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_string(),
        };
        let target = match url.query() {
            Some(q) => format!("post {}?{}", url.path(), q),
            None => format!("post {}", url.path()),
        };
        let date = date.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let digest = STANDARD.encode(Sha256::digest(body));
        let length = body.len().to_string();

        let signing_string = [
            format!("date: {}", date),
            format!("(request-target): {}", target),
            format!("host: {}", host),
            format!("content-length: {}", length),
            "content-type: application/json".to_string(),
            format!("x-content-sha256: {}", digest),
        ]
        .join("\n");

        let signature = self.sign(signing_string.as_bytes())?;
        let authorization = format!(
            "Signature version=\"1\",keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            self.key_id, SIGNED_HEADERS, signature
        );

        Ok(vec![
            ("date", date),
            ("host", host),
            ("content-length", length),
            ("content-type", "application/json".to_string()),
            ("x-content-sha256", digest),
            ("authorization", authorization),
        ])
    }

    /// RSA-SHA256 signature, standard base64
    fn sign(&self, message: &[u8]) -> Result<String, ProviderError> {
        let url_safe = jsonwebtoken::crypto::sign(message, &self.key, Algorithm::RS256)
            .map_err(|e| ProviderError::Signing(e.to_string()))?;
        let raw = URL_SAFE_NO_PAD
            .decode(url_safe)
            .map_err(|e| ProviderError::Signing(e.to_string()))?;
        Ok(STANDARD.encode(raw))
    }
}

/// Request body of `SummarizeMetricsData`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummarizeMetricsDataDetails<'a> {
    namespace: &'a str,
    query: &'a str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_group: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<&'a str>,
}

/// Error body returned by OCI services
#[derive(Debug, Default, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Classify a non-success response
pub(crate) fn error_from_response(status: u16, body: &str) -> ProviderError {
    let parsed: ServiceError = serde_json::from_str(body).unwrap_or_else(|_| ServiceError {
        code: String::new(),
        message: body.to_string(),
    });

    if status == 429 || parsed.code == "TooManyRequests" {
        ProviderError::RateLimited(parsed.message)
    } else {
        ProviderError::Status {
            status,
            code: parsed.code,
            message: parsed.message,
        }
    }
}

/// Signed HTTPS client for the OCI Monitoring API
pub struct OciClient {
    http: reqwest::Client,
    signer: RequestSigner,
    endpoint_template: String,
}

impl OciClient {
    /// Build a client from an OCI config file profile
    pub fn from_config_file(path: &Path, profile: &str) -> Result<Self, AuthError> {
        let credentials = OciCredentials::from_file(path, profile)?;
        let signer = RequestSigner::from_credentials(&credentials)?;
        Self::new(signer)
    }

    pub fn new(signer: RequestSigner) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Client(e.to_string()))?;

        Ok(Self {
            http,
            signer,
            endpoint_template: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Override the endpoint; `{region}` is substituted per call
    pub fn with_endpoint(mut self, template: impl Into<String>) -> Self {
        self.endpoint_template = template.into();
        self
    }

    /// Full request URL for `query` in `region`
    pub fn request_url(&self, region: &str, query: &Query) -> Result<Url, ProviderError> {
        let base = self.endpoint_template.replace("{region}", region);
        let mut url = Url::parse(&base)
            .and_then(|u| u.join(&format!("/{}/metrics/actions/summarizeMetricsData", API_VERSION)))
            .map_err(|e| ProviderError::Transport(format!("invalid endpoint {}: {}", base, e)))?;

        url.query_pairs_mut()
            .append_pair("compartmentId", &query.compartment_id)
            .append_pair(
                "compartmentIdInSubtree",
                if query.include_subtree { "true" } else { "false" },
            );
        Ok(url)
    }
}

#[async_trait]
impl MonitoringClient for OciClient {
    async fn summarize_metrics_data(
        &self,
        region: &str,
        query: &Query,
    ) -> Result<Vec<Series>, ProviderError> {
        let url = self.request_url(region, query)?;
        let body = serde_json::to_vec(&SummarizeMetricsDataDetails {
            namespace: &query.namespace,
            query: &query.text,
            start_time: query.start,
            end_time: query.end,
            resource_group: query.resource_group.as_deref(),
            resolution: query.resolution.as_deref(),
        })
        .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let mut request = self.http.post(url.clone());
        for (name, value) in self.signer.sign_post(&url, &body, Utc::now())? {
            request = request.header(name, value);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error_from_response(status.as_u16(), &text));
        }

        let series: Vec<Series> = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        debug!(
            region = %region,
            namespace = %query.namespace,
            series = series.len(),
            "SummarizeMetricsData succeeded"
        );
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jsonwebtoken::DecodingKey;
    use std::io::Write;

    const TEST_KEY: &str = include_str!("testdata/test_key.pem");
    const TEST_PUBLIC_KEY: &str = include_str!("testdata/test_key.pub.pem");

    fn query() -> Query {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Query {
            namespace: "oci_computeagent".into(),
            text: "CpuUtilization[1m].mean()".into(),
            metric_names: vec!["CpuUtilization".into()],
            compartment_id: "ocid1.compartment.oc1..bbbb".into(),
            include_subtree: true,
            start: end - chrono::Duration::minutes(5),
            end,
            resource_group: None,
            resolution: None,
        }
    }

    fn signer() -> RequestSigner {
        RequestSigner::from_pem("ocid1.tenancy/ocid1.user/aa:bb", TEST_KEY.as_bytes()).unwrap()
    }

    #[test]
    fn test_credentials_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[DEFAULT]\nuser=ocid1.user.oc1..u\nfingerprint=aa:bb:cc\nkey_file=key.pem\ntenancy=ocid1.tenancy.oc1..t\nregion=us-ashburn-1\n"
        )
        .unwrap();

        let creds = OciCredentials::from_file(&path, "DEFAULT").unwrap();

        assert_eq!(creds.user, "ocid1.user.oc1..u");
        assert_eq!(creds.fingerprint, "aa:bb:cc");
        assert_eq!(creds.key_file, dir.path().join("key.pem"));
        assert_eq!(creds.region.as_deref(), Some("us-ashburn-1"));
        assert_eq!(creds.key_id(), "ocid1.tenancy.oc1..t/ocid1.user.oc1..u/aa:bb:cc");
    }

    #[test]
    fn test_missing_profile_and_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "[DEFAULT]\nuser=u\ntenancy=t\nkey_file=/k.pem\n").unwrap();

        assert!(matches!(
            OciCredentials::from_file(&path, "OTHER"),
            Err(AuthError::MissingProfile(_))
        ));
        assert!(matches!(
            OciCredentials::from_file(&path, "DEFAULT"),
            Err(AuthError::MissingField("fingerprint"))
        ));
    }

    #[test]
    fn test_invalid_key_is_auth_error() {
        let result = RequestSigner::from_pem("id", b"not a key");
        assert!(matches!(result, Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn test_request_url_scopes_compartment_subtree() {
        let client = OciClient::new(signer()).unwrap();
        let url = client.request_url("eu-frankfurt-1", &query()).unwrap();

        assert_eq!(url.host_str(), Some("telemetry.eu-frankfurt-1.oraclecloud.com"));
        assert_eq!(url.path(), "/20180401/metrics/actions/summarizeMetricsData");
        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["compartmentId"], "ocid1.compartment.oc1..bbbb");
        assert_eq!(pairs["compartmentIdInSubtree"], "true");
    }

    #[test]
    fn test_endpoint_override_substitutes_region() {
        let client = OciClient::new(signer())
            .unwrap()
            .with_endpoint("http://{region}.telemetry.test:8443");
        let url = client.request_url("ap-tokyo-1", &query()).unwrap();

        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("ap-tokyo-1.telemetry.test"));
        assert_eq!(url.port(), Some(8443));
        assert_eq!(url.path(), "/20180401/metrics/actions/summarizeMetricsData");
    }

    #[test]
    fn test_signature_verifies_against_public_key() {
        let url = Url::parse("https://telemetry.us-ashburn-1.oraclecloud.com/20180401/metrics/actions/summarizeMetricsData?compartmentId=c&compartmentIdInSubtree=true").unwrap();
        let body = br#"{"namespace":"n"}"#;
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let headers: HashMap<_, _> = signer().sign_post(&url, body, date).unwrap().into_iter().collect();

        assert_eq!(headers["date"], "Fri, 01 Mar 2024 12:00:00 GMT");
        assert_eq!(headers["host"], "telemetry.us-ashburn-1.oraclecloud.com");
        assert_eq!(headers["content-length"], body.len().to_string());
        assert_eq!(headers["x-content-sha256"], STANDARD.encode(Sha256::digest(body)));

        let auth = &headers["authorization"];
        assert!(auth.starts_with("Signature version=\"1\",keyId=\"ocid1.tenancy/ocid1.user/aa:bb\""));
        assert!(auth.contains(SIGNED_HEADERS));

        let signature = auth
            .split("signature=\"")
            .nth(1)
            .and_then(|s| s.strip_suffix('"'))
            .unwrap();
        let signing_string = format!(
            "date: {}\n(request-target): post {}?{}\nhost: {}\ncontent-length: {}\ncontent-type: application/json\nx-content-sha256: {}",
            headers["date"],
            url.path(),
            url.query().unwrap(),
            headers["host"],
            headers["content-length"],
            headers["x-content-sha256"],
        );
        let raw = STANDARD.decode(signature).unwrap();
        let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap();
        assert!(jsonwebtoken::crypto::verify(
            &URL_SAFE_NO_PAD.encode(raw),
            signing_string.as_bytes(),
            &key,
            Algorithm::RS256
        )
        .unwrap());
    }

    #[test]
    fn test_request_body_shape() {
        let q = query();
        let body = serde_json::to_value(SummarizeMetricsDataDetails {
            namespace: &q.namespace,
            query: &q.text,
            start_time: q.start,
            end_time: q.end,
            resource_group: Some("frontend"),
            resolution: None,
        })
        .unwrap();

        assert_eq!(body["namespace"], "oci_computeagent");
        assert_eq!(body["query"], "CpuUtilization[1m].mean()");
        assert_eq!(body["startTime"], "2024-03-01T11:55:00Z");
        assert_eq!(body["endTime"], "2024-03-01T12:00:00Z");
        assert_eq!(body["resourceGroup"], "frontend");
        assert!(body.get("resolution").is_none());
    }

    #[test]
    fn test_error_classification() {
        let throttled = error_from_response(
            429,
            r#"{"code":"TooManyRequests","message":"Tenant request rate exceeded"}"#,
        );
        assert!(matches!(throttled, ProviderError::RateLimited(ref m) if m == "Tenant request rate exceeded"));
        assert!(throttled.is_rate_limited());

        let missing = error_from_response(404, r#"{"code":"NotAuthorizedOrNotFound","message":"nope"}"#);
        assert!(matches!(missing, ProviderError::Status { status: 404, .. }));
        assert!(!missing.is_rate_limited());

        let garbage = error_from_response(502, "<html>bad gateway</html>");
        assert!(matches!(garbage, ProviderError::Status { status: 502, ref message, .. } if message.contains("bad gateway")));
    }

    #[test]
    fn test_response_deserializes_into_series() {
        let body = r#"[{
            "namespace": "oci_computeagent",
            "compartmentId": "ocid1.compartment",
            "name": "CpuUtilization",
            "dimensions": {"resourceId": "ocid1.instance", "shape": "VM.Standard.E4.Flex"},
            "metadata": {"unit": "percent"},
            "resolution": "1m",
            "aggregatedDatapoints": [
                {"timestamp": "2024-03-01T11:58:00.000Z", "value": 12.5},
                {"timestamp": "2024-03-01T11:59:00.000Z", "value": 14.0}
            ]
        }]"#;

        let series: Vec<Series> = serde_json::from_str(body).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name.as_deref(), Some("CpuUtilization"));
        assert_eq!(series[0].dimensions["resourceId"], "ocid1.instance");
        assert_eq!(series[0].aggregated_datapoints.len(), 2);
        assert_eq!(series[0].aggregated_datapoints[1].value, 14.0);
    }
}
