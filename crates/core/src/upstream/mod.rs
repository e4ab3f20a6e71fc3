//! Upstream processing service abstraction.
//!
//! The processing service does the actual analysis of a repository. It is
//! reached over plain request/response calls: one to start a job, and one per
//! artifact to retrieve its result.

mod http;

pub use http::HttpProcessingService;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::generation::{ArtifactError, ArtifactKind, ArtifactPayload};
use crate::repository::RepositoryRef;

/// Response field holding the job token of a start-processing call.
pub const TOKEN_FIELD: &str = "gen_token";

/// Errors that can occur when talking to the processing service.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("Processing service connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Processing service request timed out")]
    Timeout,

    #[error("Processing service returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Malformed processing service response: {0}")]
    Malformed(String),

    #[error("Processing service request failed: {0}")]
    Request(String),
}

impl UpstreamError {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            UpstreamError::ConnectionFailed(_) => "connection_error",
            UpstreamError::Timeout => "timeout",
            UpstreamError::HttpStatus { .. } => "http_error",
            UpstreamError::Malformed(_) => "malformed",
            UpstreamError::Request(_) => "request_error",
        }
    }
}

impl From<UpstreamError> for ArtifactError {
    fn from(error: UpstreamError) -> Self {
        match error {
            UpstreamError::Malformed(message) => ArtifactError::MalformedResponse { message },
            other => ArtifactError::UpstreamUnavailable {
                message: other.to_string(),
            },
        }
    }
}

/// Trait for processing service backends.
#[async_trait]
pub trait ProcessingService: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Start processing a repository and return the upstream job token.
    async fn start_processing(&self, repository: &RepositoryRef) -> Result<String, UpstreamError>;

    /// Retrieve one artifact for a job token.
    async fn fetch_artifact(
        &self,
        token: &str,
        kind: ArtifactKind,
    ) -> Result<ArtifactPayload, UpstreamError>;
}

/// Extract the job token from a start-processing response body.
pub fn extract_token(body: &Value) -> Result<String, UpstreamError> {
    match body.get(TOKEN_FIELD) {
        Some(Value::String(token)) if !token.trim().is_empty() => Ok(token.clone()),
        Some(Value::String(_)) => Err(UpstreamError::Malformed(format!(
            "field '{}' is empty",
            TOKEN_FIELD
        ))),
        Some(other) => Err(UpstreamError::Malformed(format!(
            "field '{}' is not a string: {}",
            TOKEN_FIELD,
            type_name(other)
        ))),
        None => Err(UpstreamError::Malformed(format!(
            "missing field '{}'",
            TOKEN_FIELD
        ))),
    }
}

/// Extract an artifact from a get-artifact response body.
///
/// A missing or mistyped field is `Malformed`; it is never defaulted.
pub fn extract_artifact(kind: ArtifactKind, body: &Value) -> Result<ArtifactPayload, UpstreamError> {
    let field = kind.response_field();
    let value = body
        .get(field)
        .ok_or_else(|| UpstreamError::Malformed(format!("missing field '{}'", field)))?;

    let mistyped = |expected: &str| {
        UpstreamError::Malformed(format!(
            "field '{}' should be {}, got {}",
            field,
            expected,
            type_name(value)
        ))
    };

    match kind {
        ArtifactKind::Pitch => value
            .as_str()
            .map(|text| ArtifactPayload::Pitch {
                text: text.to_string(),
            })
            .ok_or_else(|| mistyped("a string")),
        ArtifactKind::Report => value
            .as_str()
            .map(|markdown| ArtifactPayload::Report {
                markdown: markdown.to_string(),
            })
            .ok_or_else(|| mistyped("a string")),
        ArtifactKind::Slides => {
            let items = value.as_array().ok_or_else(|| mistyped("an array"))?;
            let documents = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| mistyped("an array of strings"))?;
            Ok(ArtifactPayload::Slides { documents })
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_token() {
        assert_eq!(
            extract_token(&json!({ "gen_token": "abc123" })).unwrap(),
            "abc123"
        );
    }

    #[test]
    fn test_extract_token_missing_or_invalid() {
        for body in [
            json!({}),
            json!({ "token": "abc" }),
            json!({ "gen_token": null }),
            json!({ "gen_token": 42 }),
            json!({ "gen_token": "  " }),
            json!("abc123"),
        ] {
            assert!(
                matches!(extract_token(&body), Err(UpstreamError::Malformed(_))),
                "expected Malformed for {}",
                body
            );
        }
    }

    #[test]
    fn test_extract_pitch_and_report() {
        let pitch = extract_artifact(
            ArtifactKind::Pitch,
            &json!({ "elevator_pitch": "A fast web framework." }),
        )
        .unwrap();
        assert_eq!(
            pitch,
            ArtifactPayload::Pitch {
                text: "A fast web framework.".to_string()
            }
        );

        let report = extract_artifact(
            ArtifactKind::Report,
            &json!({ "market_research_report": "# Market\n\nLarge." }),
        )
        .unwrap();
        assert_eq!(
            report,
            ArtifactPayload::Report {
                markdown: "# Market\n\nLarge.".to_string()
            }
        );
    }

    #[test]
    fn test_extract_slides_preserves_order() {
        let slides = extract_artifact(
            ArtifactKind::Slides,
            &json!({ "slides": ["<html>a</html>", "<html>b</html>", "<html>c</html>"] }),
        )
        .unwrap();
        match slides {
            ArtifactPayload::Slides { documents } => {
                assert_eq!(documents, vec!["<html>a</html>", "<html>b</html>", "<html>c</html>"]);
            }
            other => panic!("expected slides, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_missing_field_is_malformed() {
        let err = extract_artifact(ArtifactKind::Report, &json!({ "report": "x" })).unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(ref m) if m.contains("market_research_report")));
    }

    #[test]
    fn test_extract_null_field_is_malformed() {
        let err = extract_artifact(ArtifactKind::Pitch, &json!({ "elevator_pitch": null }))
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));
    }

    #[test]
    fn test_extract_mistyped_slides_is_malformed() {
        for body in [
            json!({ "slides": "<html></html>" }),
            json!({ "slides": ["<html></html>", 3] }),
        ] {
            let err = extract_artifact(ArtifactKind::Slides, &body).unwrap_err();
            assert!(matches!(err, UpstreamError::Malformed(_)));
        }
    }

    #[test]
    fn test_upstream_error_to_artifact_error() {
        let malformed: ArtifactError = UpstreamError::Malformed("missing".to_string()).into();
        assert!(matches!(malformed, ArtifactError::MalformedResponse { .. }));

        let status: ArtifactError = UpstreamError::HttpStatus {
            status: 503,
            message: "busy".to_string(),
        }
        .into();
        assert!(matches!(status, ArtifactError::UpstreamUnavailable { ref message } if message.contains("503")));

        let timeout: ArtifactError = UpstreamError::Timeout.into();
        assert!(matches!(timeout, ArtifactError::UpstreamUnavailable { .. }));
    }
}
