//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock processing service injected, enabling E2E testing without a
//! running upstream.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use pitchforge_core::{
    testing::MockProcessingService, Config, GenerationConfig, GenerationOrchestrator,
};
use pitchforge_server::api::{create_router, WsBroadcaster};
use pitchforge_server::state::AppState;

/// Re-export fixtures for test convenience
pub use pitchforge_core::testing::fixtures;

/// Test fixture for E2E testing with a mock processing service.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_start() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/generations", json!({
///         "repository_url": "https://github.com/owner/repo"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock processing service - configure tokens, artifacts, delays
    pub service: Arc<MockProcessingService>,
    /// Shared state, for subscribing to WebSocket messages
    pub state: Arc<AppState>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default generation settings.
    pub async fn new() -> Self {
        Self::with_config(GenerationConfig::default()).await
    }

    /// Create a test fixture with custom generation settings.
    pub async fn with_config(generation: GenerationConfig) -> Self {
        let service = Arc::new(MockProcessingService::new());

        let config = Config {
            generation: generation.clone(),
            ..Default::default()
        };

        let orchestrator = Arc::new(GenerationOrchestrator::new(
            Arc::clone(&service) as Arc<dyn pitchforge_core::ProcessingService>,
            generation,
        ));
        let state = Arc::new(AppState::new(
            config,
            orchestrator,
            WsBroadcaster::default(),
        ));
        let router = create_router(Arc::clone(&state));

        Self {
            router,
            service,
            state,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Start a generation and return its token.
    pub async fn start(&self, repository_url: &str) -> String {
        let response = self
            .post(
                "/api/v1/generations",
                serde_json::json!({ "repository_url": repository_url }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["token"].as_str().unwrap().to_string()
    }

    /// Poll a session until every slot is present or failed.
    pub async fn wait_settled(&self, token: &str) -> Value {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.get(&format!("/api/v1/generations/{}", token)).await;
            let settled = ["pitch", "report", "slides"].iter().all(|kind| {
                matches!(
                    response.body["slots"][kind]["status"].as_str(),
                    Some("present") | Some("failed")
                )
            });
            if settled {
                return response.body;
            }
            assert!(Instant::now() < deadline, "session never settled");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
