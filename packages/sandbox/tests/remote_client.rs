// ABOUTME: HTTP-level tests for the remote sandbox client against a mock provisioning service
// ABOUTME: Covers request shape, authentication, and the three failure kinds

use harness_sandbox::{ClientError, ExtraParams, HttpSandboxClient, SandboxApi, SandboxConfig};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> SandboxConfig {
    SandboxConfig::new("test-key")
        .expect("valid config")
        .with_api_base(server.uri())
}

#[tokio::test]
async fn test_acquire_sends_tag_params_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sandbox/notion"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"benchmark": "MCP_Atlas", "workspace": "demo"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sb-42",
            "server_name": "notion",
            "server_urls": {"notion": "https://sandbox.example/notion/mcp"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpSandboxClient::new(&config_for(&server)).unwrap();
    let mut extra = ExtraParams::new();
    extra.insert("workspace".into(), json!("demo"));

    let descriptor = client.acquire("notion", &extra).await.unwrap();

    assert_eq!(descriptor.id, "sb-42");
    assert_eq!(descriptor.resource_type, "notion");
    assert_eq!(descriptor.server_name.as_deref(), Some("notion"));
    assert_eq!(
        descriptor.endpoint("notion"),
        Some("https://sandbox.example/notion/mcp")
    );
}

#[tokio::test]
async fn test_acquire_non_2xx_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sandbox/github"))
        .respond_with(ResponseTemplate::new(429).set_body_string("pool exhausted"))
        .mount(&server)
        .await;

    let client = HttpSandboxClient::new(&config_for(&server)).unwrap();
    let err = client
        .acquire("github", &ExtraParams::new())
        .await
        .unwrap_err();

    assert!(err.is_rejection());
    assert_eq!(err.status(), Some(429));
    assert!(err.to_string().contains("pool exhausted"));
}

#[tokio::test]
async fn test_acquire_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sandbox/github"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = HttpSandboxClient::new(&config_for(&server)).unwrap();
    let err = client
        .acquire("github", &ExtraParams::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_acquire_timeout_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sandbox/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "late"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = config_for(&server).with_timeouts(
        Duration::from_millis(200),
        Duration::from_millis(200),
        Duration::from_millis(200),
    );
    let client = HttpSandboxClient::new(&config).unwrap();

    let err = client.acquire("slow", &ExtraParams::new()).await.unwrap_err();
    assert!(err.is_transport(), "expected transport failure, got {}", err);
}

#[tokio::test]
async fn test_unreachable_service_is_transport_failure() {
    let config = SandboxConfig::new("k")
        .unwrap()
        .with_api_base("http://127.0.0.1:9")
        .with_timeouts(
            Duration::from_secs(2),
            Duration::from_secs(2),
            Duration::from_secs(2),
        );
    let client = HttpSandboxClient::new(&config).unwrap();

    let err = client.release("notion", "sb-1").await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_describe_and_release_paths() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sandbox/local_dev/sb-7"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sb-7",
            "status": "running"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/sandbox/local_dev/sb-7"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpSandboxClient::new(&config_for(&server)).unwrap();

    let details = client.describe("local_dev", "sb-7").await.unwrap();
    assert_eq!(details["status"], "running");

    client.release("local_dev", "sb-7").await.unwrap();
    server.verify().await;
}
