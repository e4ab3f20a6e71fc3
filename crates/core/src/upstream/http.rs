//! HTTP processing service client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::generation::{ArtifactKind, ArtifactPayload};
use crate::metrics::{UPSTREAM_REQUESTS, UPSTREAM_REQUEST_DURATION};
use crate::repository::RepositoryRef;

use super::{extract_artifact, extract_token, ProcessingService, UpstreamError};

const START_OPERATION: &str = "start-processing";

/// Processing service reached over HTTP.
///
/// Every operation is a `GET {base_url}/{operation}` with query parameters
/// and a JSON object response.
pub struct HttpProcessingService {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpProcessingService {
    /// Create a new client with the given configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        // No overall client timeout: artifact calls are held open while the
        // upstream generates, and the fetcher enforces its own budget.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn operation_url(&self, operation: &str) -> String {
        format!("{}/{}", self.base_url, operation)
    }

    /// Issue one GET and decode the body as JSON, recording metrics.
    async fn get_json(
        &self,
        operation: &str,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<Value, UpstreamError> {
        let start = Instant::now();
        let result = self.send(operation, query, timeout).await;

        UPSTREAM_REQUEST_DURATION
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());
        let label = match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        UPSTREAM_REQUESTS
            .with_label_values(&[operation, label])
            .inc();

        result
    }

    async fn send(
        &self,
        operation: &str,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<Value, UpstreamError> {
        let url = self.operation_url(operation);
        debug!(operation = operation, "Calling processing service");

        let mut request = self.client.get(&url).query(query);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::HttpStatus {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let bytes = response.bytes().await.map_err(map_transport_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamError::Malformed(format!("response is not valid JSON: {}", e)))
    }
}

fn map_transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else if e.is_connect() {
        UpstreamError::ConnectionFailed(e.to_string())
    } else {
        UpstreamError::Request(e.to_string())
    }
}

#[async_trait]
impl ProcessingService for HttpProcessingService {
    fn name(&self) -> &str {
        "http"
    }

    async fn start_processing(&self, repository: &RepositoryRef) -> Result<String, UpstreamError> {
        let body = self
            .get_json(
                START_OPERATION,
                &[
                    ("repo_url", repository.source_url.as_str()),
                    ("username", repository.owner.as_str()),
                    ("repo_name", repository.name.as_str()),
                ],
                Some(self.request_timeout),
            )
            .await?;

        extract_token(&body)
    }

    async fn fetch_artifact(
        &self,
        token: &str,
        kind: ArtifactKind,
    ) -> Result<ArtifactPayload, UpstreamError> {
        let body = self
            .get_json(kind.upstream_operation(), &[("gen_token", token)], None)
            .await?;

        extract_artifact(kind, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_url_trims_trailing_slash() {
        let config = UpstreamConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        let service = HttpProcessingService::new(&config).unwrap();
        assert_eq!(
            service.operation_url("get-slides"),
            "http://localhost:8000/get-slides"
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_connection_error() {
        // Port 9 (discard) is essentially never listening on loopback
        let config = UpstreamConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            connect_timeout_secs: 2,
        };
        let service = HttpProcessingService::new(&config).unwrap();

        let err = service
            .fetch_artifact("abc", ArtifactKind::Pitch)
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                UpstreamError::ConnectionFailed(_)
                    | UpstreamError::Timeout
                    | UpstreamError::Request(_)
            ),
            "unexpected error: {:?}",
            err
        );
    }
}
