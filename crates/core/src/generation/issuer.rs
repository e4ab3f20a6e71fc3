//! Token issuance with fail-open fallback.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::TOKENS_ISSUED;
use crate::repository::RepositoryRef;
use crate::upstream::ProcessingService;

use super::types::{GenerationToken, IssuedToken, Provenance};

/// Prefix of locally synthesized tokens.
pub const FALLBACK_PREFIX: &str = "fallback_";

const FALLBACK_SUFFIX_LEN: usize = 9;

/// Obtains generation tokens from the processing service.
///
/// Never fails: when the upstream cannot start a job, a fallback token is
/// synthesized and tagged `Provenance::Fallback`.
pub struct TokenIssuer {
    service: Arc<dyn ProcessingService>,
}

impl TokenIssuer {
    pub fn new(service: Arc<dyn ProcessingService>) -> Self {
        Self { service }
    }

    /// Start processing `repository` upstream and return its token.
    pub async fn issue(&self, repository: &RepositoryRef) -> IssuedToken {
        let issued = match self.service.start_processing(repository).await {
            Ok(token) => {
                info!(
                    repository = %repository,
                    backend = self.service.name(),
                    "Processing service issued generation token"
                );
                IssuedToken {
                    token: GenerationToken::new(token),
                    provenance: Provenance::Upstream,
                }
            }
            Err(e) => {
                let token = fallback_token();
                warn!(
                    repository = %repository,
                    token = %token,
                    "Start-processing failed, using fallback token: {}",
                    e
                );
                IssuedToken {
                    token,
                    provenance: Provenance::Fallback,
                }
            }
        };

        TOKENS_ISSUED
            .with_label_values(&[issued.provenance.as_str()])
            .inc();
        issued
    }
}

/// Synthesize a `fallback_<unix millis>_<suffix>` token.
pub fn fallback_token() -> GenerationToken {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(FALLBACK_SUFFIX_LEN)
        .collect();
    GenerationToken::new(format!(
        "{}{}_{}",
        FALLBACK_PREFIX,
        Utc::now().timestamp_millis(),
        suffix
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockProcessingService};
    use crate::upstream::UpstreamError;
    use serde_json::json;
    use std::collections::HashSet;

    fn assert_fallback_shape(token: &GenerationToken) {
        let rest = token
            .as_str()
            .strip_prefix(FALLBACK_PREFIX)
            .expect("missing fallback prefix");
        let (millis, suffix) = rest.split_once('_').expect("missing suffix separator");
        assert!(!millis.is_empty() && millis.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix.len(), FALLBACK_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_issue_upstream_token() {
        let service = Arc::new(MockProcessingService::new());
        service.set_start_body(json!({ "gen_token": "abc123" })).await;
        let issuer = TokenIssuer::new(service.clone());

        let issued = issuer.issue(&fixtures::repository("facebook", "react")).await;

        assert_eq!(issued.token.as_str(), "abc123");
        assert_eq!(issued.provenance, Provenance::Upstream);

        let calls = service.recorded_starts().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].owner, "facebook");
        assert_eq!(calls[0].name, "react");
    }

    #[tokio::test]
    async fn test_issue_falls_back_on_transport_error() {
        let service = Arc::new(MockProcessingService::new());
        service
            .set_start_error(UpstreamError::ConnectionFailed("refused".to_string()))
            .await;
        let issuer = TokenIssuer::new(service);

        let issued = issuer.issue(&fixtures::repository("a", "b")).await;

        assert_eq!(issued.provenance, Provenance::Fallback);
        assert_fallback_shape(&issued.token);
    }

    #[tokio::test]
    async fn test_issue_falls_back_on_http_status() {
        let service = Arc::new(MockProcessingService::new());
        service
            .set_start_error(UpstreamError::HttpStatus {
                status: 500,
                message: "boom".to_string(),
            })
            .await;
        let issuer = TokenIssuer::new(service);

        let issued = issuer.issue(&fixtures::repository("a", "b")).await;
        assert_eq!(issued.provenance, Provenance::Fallback);
    }

    #[tokio::test]
    async fn test_issue_falls_back_on_missing_token_field() {
        let service = Arc::new(MockProcessingService::new());
        service.set_start_body(json!({ "status": "queued" })).await;
        let issuer = TokenIssuer::new(service);

        let issued = issuer.issue(&fixtures::repository("a", "b")).await;
        assert_eq!(issued.provenance, Provenance::Fallback);
        assert_fallback_shape(&issued.token);
    }

    #[test]
    fn test_fallback_tokens_are_unique() {
        let tokens: HashSet<GenerationToken> = (0..1000).map(|_| fallback_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_fallback_token_shape() {
        assert_fallback_shape(&fallback_token());
    }
}
