//! Mock processing service for testing.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::generation::{ArtifactKind, ArtifactPayload};
use crate::repository::RepositoryRef;
use crate::upstream::{extract_artifact, extract_token, ProcessingService, UpstreamError};

use super::fixtures;

/// What the mock answers for an artifact request.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return this payload directly.
    Payload(ArtifactPayload),
    /// Return this JSON body, decoded exactly like a real response.
    Body(Value),
    /// Fail with this error.
    Error(UpstreamError),
}

/// Configured behavior for one artifact kind.
#[derive(Debug, Clone)]
pub struct MockArtifact {
    pub response: MockResponse,
    pub delay: Duration,
}

impl MockArtifact {
    pub fn payload(payload: ArtifactPayload) -> Self {
        Self {
            response: MockResponse::Payload(payload),
            delay: Duration::ZERO,
        }
    }

    pub fn body(body: Value) -> Self {
        Self {
            response: MockResponse::Body(body),
            delay: Duration::ZERO,
        }
    }

    pub fn error(error: UpstreamError) -> Self {
        Self {
            response: MockResponse::Error(error),
            delay: Duration::ZERO,
        }
    }

    /// Wait this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A recorded artifact request for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    pub token: String,
    pub kind: ArtifactKind,
    /// When the request was made.
    pub timestamp: Instant,
}

/// Mock implementation of the ProcessingService trait.
///
/// Provides controllable behavior for testing:
/// - Issue sequential tokens (`mock-token-1`, `mock-token-2`, ...)
/// - Return configurable artifacts, raw bodies or errors per kind
/// - Simulate slow upstream calls
/// - Record every call for assertions
#[derive(Debug)]
pub struct MockProcessingService {
    /// Overrides the start-processing response body.
    start_body: Arc<RwLock<Option<Value>>>,
    /// If set, start-processing fails with this error.
    start_error: Arc<RwLock<Option<UpstreamError>>>,
    /// Simulated start-processing latency.
    start_delay: Arc<RwLock<Duration>>,
    /// Per-kind artifact behavior.
    artifacts: Arc<RwLock<HashMap<ArtifactKind, MockArtifact>>>,
    /// Recorded start-processing calls.
    starts: Arc<RwLock<Vec<RepositoryRef>>>,
    /// Recorded artifact requests.
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    next_token: AtomicU64,
}

impl Default for MockProcessingService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessingService {
    /// Create a mock that succeeds for every operation.
    pub fn new() -> Self {
        let artifacts = HashMap::from([
            (ArtifactKind::Pitch, MockArtifact::payload(fixtures::pitch())),
            (ArtifactKind::Report, MockArtifact::payload(fixtures::report())),
            (ArtifactKind::Slides, MockArtifact::payload(fixtures::slides(3))),
        ]);

        Self {
            start_body: Arc::new(RwLock::new(None)),
            start_error: Arc::new(RwLock::new(None)),
            start_delay: Arc::new(RwLock::new(Duration::ZERO)),
            artifacts: Arc::new(RwLock::new(artifacts)),
            starts: Arc::new(RwLock::new(Vec::new())),
            fetches: Arc::new(RwLock::new(Vec::new())),
            next_token: AtomicU64::new(1),
        }
    }

    /// Answer start-processing with this body instead of a generated token.
    pub async fn set_start_body(&self, body: Value) {
        *self.start_body.write().await = Some(body);
    }

    /// Make start-processing fail.
    pub async fn set_start_error(&self, error: UpstreamError) {
        *self.start_error.write().await = Some(error);
    }

    /// Let start-processing succeed again.
    pub async fn clear_start_error(&self) {
        *self.start_error.write().await = None;
    }

    pub async fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.write().await = delay;
    }

    /// Configure the response for one artifact kind.
    pub async fn set_artifact(&self, kind: ArtifactKind, artifact: MockArtifact) {
        self.artifacts.write().await.insert(kind, artifact);
    }

    /// Change only the latency of one artifact kind.
    pub async fn set_artifact_delay(&self, kind: ArtifactKind, delay: Duration) {
        let mut artifacts = self.artifacts.write().await;
        let entry = artifacts
            .entry(kind)
            .or_insert_with(|| MockArtifact::error(UpstreamError::Malformed("unset".to_string())));
        entry.delay = delay;
    }

    /// Get recorded start-processing calls.
    pub async fn recorded_starts(&self) -> Vec<RepositoryRef> {
        self.starts.read().await.clone()
    }

    /// Get recorded artifact requests.
    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    /// Number of artifact requests that reached the mock.
    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }

    /// Artifact requests made with `token`.
    pub async fn fetches_for(&self, token: &str) -> Vec<RecordedFetch> {
        self.fetches
            .read()
            .await
            .iter()
            .filter(|f| f.token == token)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProcessingService for MockProcessingService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start_processing(&self, repository: &RepositoryRef) -> Result<String, UpstreamError> {
        self.starts.write().await.push(repository.clone());

        let delay = *self.start_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.start_error.read().await.clone() {
            return Err(error);
        }

        let body = match self.start_body.read().await.clone() {
            Some(body) => body,
            None => {
                let n = self.next_token.fetch_add(1, Ordering::SeqCst);
                json!({ "gen_token": format!("mock-token-{}", n) })
            }
        };
        extract_token(&body)
    }

    async fn fetch_artifact(
        &self,
        token: &str,
        kind: ArtifactKind,
    ) -> Result<ArtifactPayload, UpstreamError> {
        self.fetches.write().await.push(RecordedFetch {
            token: token.to_string(),
            kind,
            timestamp: Instant::now(),
        });

        let artifact = self
            .artifacts
            .read()
            .await
            .get(&kind)
            .cloned()
            .ok_or_else(|| UpstreamError::HttpStatus {
                status: 404,
                message: format!("no mock configured for {}", kind),
            })?;

        if !artifact.delay.is_zero() {
            tokio::time::sleep(artifact.delay).await;
        }

        match artifact.response {
            MockResponse::Payload(payload) => Ok(payload),
            MockResponse::Body(body) => extract_artifact(kind, &body),
            MockResponse::Error(error) => Err(error),
        }
    }
}
