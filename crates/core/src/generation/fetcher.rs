//! Artifact retrieval for a single `(token, kind)` pair.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::metrics::{InFlightGuard, FETCHES_IN_FLIGHT, SLOT_OUTCOMES};
use crate::upstream::ProcessingService;

use super::types::{ArtifactError, ArtifactKind, ArtifactPayload, ArtifactSlot, IssuedToken, Provenance};

/// Pitch substituted when the upstream is unreachable and
/// `generation.pitch_placeholder` is enabled.
pub const PITCH_PLACEHOLDER: &str = "This is a sample elevator pitch for your repository. \
The AI has analyzed your codebase and generated a compelling pitch that highlights the key \
features and value proposition of your project. This pitch can be used for presentations, \
investor meetings, or to quickly explain your project to others.";

/// Fetches one artifact and turns the outcome into a terminal slot.
pub struct ArtifactFetcher {
    service: Arc<dyn ProcessingService>,
    fetch_timeout: Duration,
    pitch_placeholder: bool,
}

impl ArtifactFetcher {
    pub fn new(service: Arc<dyn ProcessingService>, config: &GenerationConfig) -> Self {
        Self {
            service,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            pitch_placeholder: config.pitch_placeholder,
        }
    }

    /// Override the per-fetch budget (tests use sub-second budgets).
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Fetch `kind` for `issued`. Always returns a Present or Failed slot.
    pub async fn fetch(&self, issued: &IssuedToken, kind: ArtifactKind) -> ArtifactSlot {
        let in_flight = InFlightGuard::new(&FETCHES_IN_FLIGHT);
        let outcome = self.fetch_payload(issued, kind).await;
        drop(in_flight);

        match outcome {
            Ok(payload) => {
                info!(token = %issued.token, kind = %kind, "Artifact retrieved");
                SLOT_OUTCOMES.with_label_values(&[kind.as_str(), "present"]).inc();
                ArtifactSlot::present(payload)
            }
            Err(error) if self.uses_placeholder(kind, &error) => {
                warn!(
                    token = %issued.token,
                    "Pitch unavailable, substituting placeholder: {}",
                    error
                );
                SLOT_OUTCOMES.with_label_values(&[kind.as_str(), "placeholder"]).inc();
                ArtifactSlot::present(ArtifactPayload::Pitch {
                    text: PITCH_PLACEHOLDER.to_string(),
                })
            }
            Err(error) => {
                warn!(token = %issued.token, kind = %kind, "Artifact fetch failed: {}", error);
                SLOT_OUTCOMES.with_label_values(&[kind.as_str(), error.code()]).inc();
                ArtifactSlot::failed(error)
            }
        }
    }

    async fn fetch_payload(
        &self,
        issued: &IssuedToken,
        kind: ArtifactKind,
    ) -> Result<ArtifactPayload, ArtifactError> {
        if issued.provenance == Provenance::Fallback {
            debug!(token = %issued.token, kind = %kind, "Skipping fetch for fallback token");
            return Err(ArtifactError::FallbackToken);
        }

        let request = self.service.fetch_artifact(issued.token.as_str(), kind);
        let payload = match tokio::time::timeout(self.fetch_timeout, request).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ArtifactError::TimedOut {
                    after_ms: self.fetch_timeout.as_millis() as u64,
                })
            }
        };

        if payload.kind() != kind {
            return Err(ArtifactError::MalformedResponse {
                message: format!("expected {} payload, got {}", kind, payload.kind()),
            });
        }

        Ok(payload)
    }

    /// The placeholder only covers an unreachable upstream, never bad data.
    fn uses_placeholder(&self, kind: ArtifactKind, error: &ArtifactError) -> bool {
        self.pitch_placeholder
            && kind == ArtifactKind::Pitch
            && matches!(
                error,
                ArtifactError::UpstreamUnavailable { .. } | ArtifactError::TimedOut { .. }
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationToken;
    use crate::testing::{MockArtifact, MockProcessingService};
    use crate::upstream::UpstreamError;
    use serde_json::json;

    fn upstream_token(value: &str) -> IssuedToken {
        IssuedToken {
            token: GenerationToken::new(value),
            provenance: Provenance::Upstream,
        }
    }

    fn fetcher(service: Arc<MockProcessingService>, pitch_placeholder: bool) -> ArtifactFetcher {
        let config = GenerationConfig {
            pitch_placeholder,
            ..Default::default()
        };
        ArtifactFetcher::new(service, &config)
    }

    #[tokio::test]
    async fn test_fetch_present() {
        let service = Arc::new(MockProcessingService::new());
        service
            .set_artifact(
                ArtifactKind::Report,
                MockArtifact::body(json!({ "market_research_report": "# TAM" })),
            )
            .await;

        let slot = fetcher(service.clone(), false)
            .fetch(&upstream_token("tok"), ArtifactKind::Report)
            .await;

        assert_eq!(
            slot.payload(),
            Some(&ArtifactPayload::Report {
                markdown: "# TAM".to_string()
            })
        );
        let calls = service.recorded_fetches().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].token, "tok");
        assert_eq!(calls[0].kind, ArtifactKind::Report);
    }

    #[tokio::test]
    async fn test_fetch_missing_field_is_malformed_not_empty() {
        let service = Arc::new(MockProcessingService::new());
        service
            .set_artifact(ArtifactKind::Slides, MockArtifact::body(json!({ "detail": "pending" })))
            .await;

        let slot = fetcher(service, false)
            .fetch(&upstream_token("tok"), ArtifactKind::Slides)
            .await;

        assert!(matches!(
            slot.error(),
            Some(ArtifactError::MalformedResponse { .. })
        ));
        assert!(slot.payload().is_none());
    }

    #[tokio::test]
    async fn test_fetch_unavailable_is_failed_by_default() {
        let service = Arc::new(MockProcessingService::new());
        service
            .set_artifact(
                ArtifactKind::Pitch,
                MockArtifact::error(UpstreamError::HttpStatus {
                    status: 502,
                    message: "bad gateway".to_string(),
                }),
            )
            .await;

        let slot = fetcher(service, false)
            .fetch(&upstream_token("tok"), ArtifactKind::Pitch)
            .await;

        assert!(matches!(
            slot.error(),
            Some(ArtifactError::UpstreamUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_pitch_placeholder_on_unavailable() {
        let service = Arc::new(MockProcessingService::new());
        service
            .set_artifact(
                ArtifactKind::Pitch,
                MockArtifact::error(UpstreamError::ConnectionFailed("refused".to_string())),
            )
            .await;

        let slot = fetcher(service, true)
            .fetch(&upstream_token("tok"), ArtifactKind::Pitch)
            .await;

        assert_eq!(
            slot.payload(),
            Some(&ArtifactPayload::Pitch {
                text: PITCH_PLACEHOLDER.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_pitch_placeholder_does_not_mask_malformed() {
        let service = Arc::new(MockProcessingService::new());
        service
            .set_artifact(ArtifactKind::Pitch, MockArtifact::body(json!({ "pitch": "wrong field" })))
            .await;

        let slot = fetcher(service, true)
            .fetch(&upstream_token("tok"), ArtifactKind::Pitch)
            .await;

        assert!(matches!(
            slot.error(),
            Some(ArtifactError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_placeholder_is_pitch_only() {
        let service = Arc::new(MockProcessingService::new());
        service
            .set_artifact(
                ArtifactKind::Report,
                MockArtifact::error(UpstreamError::ConnectionFailed("refused".to_string())),
            )
            .await;

        let slot = fetcher(service, true)
            .fetch(&upstream_token("tok"), ArtifactKind::Report)
            .await;

        assert!(matches!(
            slot.error(),
            Some(ArtifactError::UpstreamUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_fallback_token_short_circuits() {
        let service = Arc::new(MockProcessingService::new());
        let issued = IssuedToken {
            token: GenerationToken::new("fallback_1700000000000_abc123def"),
            provenance: Provenance::Fallback,
        };

        for kind in ArtifactKind::ALL {
            let slot = fetcher(service.clone(), true).fetch(&issued, kind).await;
            assert_eq!(slot.error(), Some(&ArtifactError::FallbackToken));
        }
        assert_eq!(service.fetch_count().await, 0);
    }

    #[tokio::test]
    async fn test_fallback_shaped_upstream_token_is_fetched() {
        // Provenance decides, not the token text
        let service = Arc::new(MockProcessingService::new());
        let slot = fetcher(service.clone(), false)
            .fetch(&upstream_token("fallback_123_abc"), ArtifactKind::Pitch)
            .await;

        assert!(slot.payload().is_some());
        assert_eq!(service.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let service = Arc::new(MockProcessingService::new());
        service
            .set_artifact_delay(ArtifactKind::Slides, Duration::from_millis(500))
            .await;

        let slot = fetcher(service, false)
            .with_fetch_timeout(Duration::from_millis(50))
            .fetch(&upstream_token("tok"), ArtifactKind::Slides)
            .await;

        assert_eq!(
            slot.error(),
            Some(&ArtifactError::TimedOut { after_ms: 50 })
        );
        assert_eq!(
            slot.error().map(|error| error.to_string()).as_deref(),
            Some("fetch timed out after 50ms")
        );
    }

    #[tokio::test]
    async fn test_wrong_payload_kind_is_malformed() {
        let service = Arc::new(MockProcessingService::new());
        service
            .set_artifact(
                ArtifactKind::Report,
                MockArtifact::payload(ArtifactPayload::Pitch {
                    text: "not a report".to_string(),
                }),
            )
            .await;

        let slot = fetcher(service, false)
            .fetch(&upstream_token("tok"), ArtifactKind::Report)
            .await;

        assert!(matches!(
            slot.error(),
            Some(ArtifactError::MalformedResponse { .. })
        ));
    }
}
