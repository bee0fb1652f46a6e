// ABOUTME: Remote resource client for the sandbox provisioning service
// ABOUTME: Issues authenticated create/describe/delete calls for one physical sandbox at a time

use async_trait::async_trait;
use harness_config::constants::KLAVIS_API_KEY;
use harness_config::{ConfigError, SandboxConfig};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Network failure or timeout; the request may never have reached the service.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    /// The service answered with a non-2xx status.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Rejected { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Extra JSON fields merged into an acquisition request body.
pub type ExtraParams = Map<String, Value>;

/// Free-form details document returned by the describe endpoint.
pub type SandboxDetails = Value;

/// One physical sandbox acquired from the provisioning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxDescriptor {
    pub id: String,
    /// Resource type used to request the sandbox; also the type it is released under.
    pub resource_type: String,
    pub server_name: Option<String>,
    /// Response key to endpoint URL, in the order the service listed them.
    pub endpoints: Vec<(String, String)>,
}

impl SandboxDescriptor {
    pub fn endpoint(&self, key: &str) -> Option<&str> {
        self.endpoints
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, url)| url.as_str())
    }

    pub fn first_endpoint(&self) -> Option<(&str, &str)> {
        self.endpoints
            .first()
            .map(|(k, url)| (k.as_str(), url.as_str()))
    }
}

#[derive(Debug, Deserialize)]
struct AcquireResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    sandbox_id: Option<String>,
    #[serde(default)]
    server_name: Option<String>,
    #[serde(default)]
    server_urls: Option<Map<String, Value>>,
}

impl AcquireResponse {
    fn into_descriptor(self, resource_type: &str) -> Result<SandboxDescriptor> {
        let id = self
            .id
            .or(self.sandbox_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ClientError::InvalidResponse(format!(
                    "acquire response for '{}' has no sandbox id",
                    resource_type
                ))
            })?;

        let mut endpoints = Vec::new();
        for (key, value) in self.server_urls.unwrap_or_default() {
            match value {
                Value::String(url) => endpoints.push((key, url)),
                other => warn!(
                    sandbox_id = %id,
                    key = %key,
                    "Ignoring non-string endpoint value: {}",
                    other
                ),
            }
        }

        Ok(SandboxDescriptor {
            id,
            resource_type: resource_type.to_string(),
            server_name: self.server_name,
            endpoints,
        })
    }
}

/// Request/response contract of the provisioning service.
#[async_trait]
pub trait SandboxApi: Send + Sync {
    /// Create a sandbox of the given resource type.
    async fn acquire(
        &self,
        resource_type: &str,
        extra_params: &ExtraParams,
    ) -> Result<SandboxDescriptor>;

    /// Fetch the current details of a sandbox.
    async fn describe(&self, resource_type: &str, sandbox_id: &str) -> Result<SandboxDetails>;

    /// Delete a sandbox. Never retried by callers.
    async fn release(&self, resource_type: &str, sandbox_id: &str) -> Result<()>;
}

/// Base URL plus bearer credential shared by every call against the service.
#[derive(Clone)]
pub(crate) struct ApiEndpoint {
    base: Url,
    api_key: String,
}

impl ApiEndpoint {
    pub(crate) fn from_config(config: &SandboxConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential(KLAVIS_API_KEY).into());
        }

        let base = Url::parse(&config.api_base)
            .map_err(|e| ClientError::InvalidBaseUrl(format!("{}: {}", config.api_base, e)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(config.api_base.clone()));
        }

        Ok(Self {
            base,
            api_key: config.api_key.clone(),
        })
    }

    /// `{base}/sandbox/{segments...}` with each segment percent-encoded.
    pub(crate) fn sandbox_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("sandbox").extend(segments);
        }
        url
    }

    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.api_key)
    }
}

/// Build the shared reqwest client. Per-call timeouts are applied on each request.
pub(crate) fn build_http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ClientError::Transport(e.to_string()))
}

/// Pass through 2xx responses; turn anything else into `Rejected`.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());
    Err(ClientError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Parse a JSON body, treating an empty body as `null`.
pub(crate) async fn read_json(response: Response) -> Result<Value> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

/// reqwest-backed implementation of [`SandboxApi`].
pub struct HttpSandboxClient {
    http: Client,
    endpoint: ApiEndpoint,
    benchmark_tag: String,
    acquire_timeout: Duration,
    release_timeout: Duration,
}

impl HttpSandboxClient {
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        Ok(Self {
            http: build_http_client()?,
            endpoint: ApiEndpoint::from_config(config)?,
            benchmark_tag: config.benchmark_tag.clone(),
            acquire_timeout: config.acquire_timeout,
            release_timeout: config.release_timeout,
        })
    }

    fn acquire_body(&self, extra_params: &ExtraParams) -> Value {
        let mut body = extra_params.clone();
        body.insert(
            "benchmark".to_string(),
            Value::String(self.benchmark_tag.clone()),
        );
        Value::Object(body)
    }
}

#[async_trait]
impl SandboxApi for HttpSandboxClient {
    async fn acquire(
        &self,
        resource_type: &str,
        extra_params: &ExtraParams,
    ) -> Result<SandboxDescriptor> {
        let url = self.endpoint.sandbox_url(&[resource_type]);
        debug!(resource_type, %url, "Acquiring sandbox");

        let response = self
            .endpoint
            .authorize(self.http.post(url))
            .timeout(self.acquire_timeout)
            .json(&self.acquire_body(extra_params))
            .send()
            .await?;

        let response = check_status(response).await?;
        let parsed: AcquireResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        parsed.into_descriptor(resource_type)
    }

    async fn describe(&self, resource_type: &str, sandbox_id: &str) -> Result<SandboxDetails> {
        let url = self.endpoint.sandbox_url(&[resource_type, sandbox_id]);

        let response = self
            .endpoint
            .authorize(self.http.get(url))
            .timeout(self.acquire_timeout)
            .send()
            .await?;

        read_json(check_status(response).await?).await
    }

    async fn release(&self, resource_type: &str, sandbox_id: &str) -> Result<()> {
        let url = self.endpoint.sandbox_url(&[resource_type, sandbox_id]);
        debug!(resource_type, sandbox_id, "Releasing sandbox");

        let response = self
            .endpoint
            .authorize(self.http.delete(url))
            .timeout(self.release_timeout)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> AcquireResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_descriptor_keeps_endpoint_order() {
        let descriptor = parse(json!({
            "id": "sb-1",
            "server_name": "local_dev",
            "server_urls": {"terminal": "https://t", "filesystem": "https://f"}
        }))
        .into_descriptor("local_dev")
        .unwrap();

        assert_eq!(descriptor.id, "sb-1");
        assert_eq!(descriptor.resource_type, "local_dev");
        assert_eq!(descriptor.first_endpoint(), Some(("terminal", "https://t")));
        assert_eq!(descriptor.endpoint("filesystem"), Some("https://f"));
        assert_eq!(descriptor.endpoint("git"), None);
    }

    #[test]
    fn test_legacy_sandbox_id_field_accepted() {
        let descriptor = parse(json!({"sandbox_id": "legacy", "server_name": "notion"}))
            .into_descriptor("notion")
            .unwrap();
        assert_eq!(descriptor.id, "legacy");
        assert!(descriptor.endpoints.is_empty());
    }

    #[test]
    fn test_missing_id_is_invalid_response() {
        let err = parse(json!({"server_urls": {"a": "b"}}))
            .into_descriptor("notion")
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }

    #[test]
    fn test_non_string_urls_are_skipped() {
        let descriptor = parse(json!({"id": "x", "server_urls": {"bad": 3, "good": "u"}}))
            .into_descriptor("t")
            .unwrap();
        assert_eq!(descriptor.endpoints, vec![("good".to_string(), "u".to_string())]);
    }

    #[test]
    fn test_sandbox_url_encodes_segments() {
        let config = SandboxConfig::new("key")
            .unwrap()
            .with_api_base("http://localhost:8080/api/");
        let endpoint = ApiEndpoint::from_config(&config).unwrap();

        let url = endpoint.sandbox_url(&["local_dev", "a b", "dump"]);
        assert_eq!(url.as_str(), "http://localhost:8080/api/sandbox/local_dev/a%20b/dump");
    }

    #[test]
    fn test_missing_credential_rejected_at_construction() {
        let mut config = SandboxConfig::new("key").unwrap();
        config.api_key = String::new();
        assert!(matches!(
            HttpSandboxClient::new(&config),
            Err(ClientError::Config(ConfigError::MissingCredential(_)))
        ));
    }

    #[test]
    fn test_benchmark_tag_overrides_extra_params() {
        let config = SandboxConfig::new("key").unwrap().with_benchmark_tag("Tag");
        let client = HttpSandboxClient::new(&config).unwrap();

        let mut extra = ExtraParams::new();
        extra.insert("benchmark".into(), json!("spoofed"));
        extra.insert("region".into(), json!("us"));

        assert_eq!(
            client.acquire_body(&extra),
            json!({"benchmark": "Tag", "region": "us"})
        );
    }
}
