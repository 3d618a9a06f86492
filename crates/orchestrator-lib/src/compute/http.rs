//! HTTP client for the compute service

use super::{check_identity, AnalysisEngine, ComputeError};
use crate::contract::{self, AnalysisRequest, AnalysisResponse};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Path of the analysis endpoint relative to the base URL
pub const ANALYZE_PATH: &str = "v1/analyze";

/// Longest error body excerpt kept in an error message
const MAX_ERROR_EXCERPT: usize = 300;

/// Configuration for the HTTP compute client
#[derive(Debug, Clone)]
pub struct HttpComputeConfig {
    /// Base URL of the compute service
    pub base_url: String,
    /// Connect timeout; the overall deadline is passed per call
    pub connect_timeout: Duration,
    /// Optional bearer token sent with every call
    pub api_token: Option<String>,
}

impl Default for HttpComputeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://compute-service:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            api_token: None,
        }
    }
}

/// Compute service client over HTTP/JSON
pub struct HttpComputeClient {
    client: Client,
    endpoint: Url,
    api_token: Option<String>,
}

impl HttpComputeClient {
    /// Create a new client
    pub fn new(config: HttpComputeConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base = Url::parse(&config.base_url).context("Invalid compute service URL")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join(ANALYZE_PATH)
            .context("Invalid compute service URL")?;

        Ok(Self {
            client,
            endpoint,
            api_token: config.api_token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call(&self, body: &Value) -> Result<Value, ComputeError> {
        let mut builder = self.client.post(self.endpoint.clone()).json(body);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let body: Option<Value> = serde_json::from_slice(&bytes).ok();
            let message = body
                .as_ref()
                .and_then(error_detail)
                .unwrap_or_else(|| excerpt(&String::from_utf8_lossy(&bytes)));
            return Err(ComputeError::Http {
                status: status.as_u16(),
                message,
                body,
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ComputeError::ResponseInvalid(format!("body is not JSON: {}", e)))
    }
}

fn transport_error(e: reqwest::Error) -> ComputeError {
    ComputeError::Transport(e.to_string())
}

/// Pull a human-readable message out of a JSON error body
fn error_detail(body: &Value) -> Option<String> {
    ["detail", "error", "message"]
        .iter()
        .find_map(|key| match body.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .map(|s| excerpt(&s))
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_ERROR_EXCERPT {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_ERROR_EXCERPT).collect();
        format!("{}...", cut)
    }
}

#[async_trait]
impl AnalysisEngine for HttpComputeClient {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        timeout: Duration,
    ) -> Result<AnalysisResponse, ComputeError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ComputeError::Transport(format!("failed to encode request: {}", e)))?;
        contract::validate_request(&body).map_err(ComputeError::RequestInvalid)?;

        debug!(
            run_id = %request.run_id,
            endpoint = %self.endpoint,
            timeout_secs = timeout.as_secs(),
            "Calling compute service"
        );

        let raw = match tokio::time::timeout(timeout, self.call(&body)).await {
            Ok(result) => result?,
            Err(_) => return Err(ComputeError::Timeout(timeout)),
        };

        let response = contract::validate_response(&raw).map_err(|e| {
            warn!(run_id = %request.run_id, error = %e, "Compute response failed validation");
            ComputeError::ResponseInvalid(e.to_string())
        })?;
        check_identity(request, &response)?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_request, create_test_response};
    use serde_json::json;

    fn client_for(url: &str) -> HttpComputeClient {
        HttpComputeClient::new(HttpComputeConfig {
            base_url: url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_base_path() {
        let client = client_for("http://compute:8000/api");
        assert_eq!(client.endpoint().as_str(), "http://compute:8000/api/v1/analyze");

        let client = client_for("http://compute:8000");
        assert_eq!(client.endpoint().as_str(), "http://compute:8000/v1/analyze");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = HttpComputeClient::new(HttpComputeConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "Invalid compute service URL");
        assert_eq!(err.chain().count(), 2);
    }

    #[tokio::test]
    async fn test_successful_analysis() {
        let mut server = mockito::Server::new_async().await;
        let response = create_test_response("run-1", "P1", false);
        let mock = server
            .mock("POST", "/v1/analyze")
            .match_body(mockito::Matcher::PartialJson(json!({ "runId": "run-1" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&response).unwrap())
            .create_async()
            .await;

        let client = client_for(&server.url());
        let result = client
            .analyze(&create_test_request("run-1", "P1"), Duration::from_secs(5))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, response);
    }

    #[tokio::test]
    async fn test_http_error_keeps_status_and_detail() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/analyze")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"detail":"pointMapping has no temperature tags"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .analyze(&create_test_request("run-1", "P1"), Duration::from_secs(5))
            .await
            .unwrap_err();

        match &err {
            ComputeError::Http {
                status,
                message,
                body,
            } => {
                assert_eq!(*status, 422);
                assert_eq!(message, "pointMapping has no temperature tags");
                assert!(body.is_some());
            }
            other => panic!("expected Http error, got {:?}", other),
        }
        assert!(err.to_string().contains("422"));
    }

    #[tokio::test]
    async fn test_http_error_with_plain_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/analyze")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .analyze(&create_test_request("run-1", "P1"), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ComputeError::Http { status: 502, ref message, body: None } if message == "Bad Gateway"
        ));
    }

    #[tokio::test]
    async fn test_malformed_response_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let mut body = serde_json::to_value(create_test_response("run-1", "P1", false)).unwrap();
        body["fddFindings"][0]["severity"] = json!("catastrophic");
        let _mock = server
            .mock("POST", "/v1/analyze")
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .analyze(&create_test_request("run-1", "P1"), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "response_invalid");
        assert!(err.to_string().contains("fddFindings[0].severity"));
    }

    #[tokio::test]
    async fn test_non_json_response_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/analyze")
            .with_status(200)
            .with_body("<html>ok</html>")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .analyze(&create_test_request("run-1", "P1"), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ComputeError::ResponseInvalid(_)));
    }

    #[tokio::test]
    async fn test_response_for_other_run_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/analyze")
            .with_status(200)
            .with_body(serde_json::to_string(&create_test_response("run-2", "P1", false)).unwrap())
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .analyze(&create_test_request("run-1", "P1"), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ComputeError::ResponseInvalid(_)));
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/analyze")
            .expect(0)
            .create_async()
            .await;

        let mut request = create_test_request("run-1", "P1");
        request.systems.clear();

        let client = client_for(&server.url());
        let err = client.analyze(&request, Duration::from_secs(5)).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ComputeError::RequestInvalid(_)));
    }

    #[tokio::test]
    async fn test_deadline_expiry_is_a_timeout() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = client_for(&format!("http://{}", addr));
        let err = client
            .analyze(&create_test_request("run-1", "P1"), Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, ComputeError::Timeout(d) if d == Duration::from_millis(100)));
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{}", addr));
        let err = client
            .analyze(&create_test_request("run-1", "P1"), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ComputeError::Transport(_)));
    }

    #[test]
    fn test_error_detail_extraction() {
        assert_eq!(error_detail(&json!({ "error": "boom" })).as_deref(), Some("boom"));
        assert_eq!(
            error_detail(&json!({ "detail": [{ "loc": ["body"] }] })).as_deref(),
            Some(r#"[{"loc":["body"]}]"#)
        );
        assert_eq!(error_detail(&json!({ "status": 500 })), None);
    }

    #[test]
    fn test_excerpt_truncates_long_bodies() {
        let long = "x".repeat(MAX_ERROR_EXCERPT + 50);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), MAX_ERROR_EXCERPT + 3);
    }
}
