//! Types for the generation orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::repository::RepositoryRef;

/// Opaque token correlating a generation request with later artifact retrievals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationToken(String);

impl GenerationToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GenerationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GenerationToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where a generation token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Issued by the upstream service; a real job exists behind it.
    Upstream,
    /// Synthesized locally after start-processing failed. No upstream job exists.
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Upstream => "upstream",
            Provenance::Fallback => "fallback",
        }
    }
}

/// A token together with its provenance.
///
/// Provenance travels with the value; never infer it from the token text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: GenerationToken,
    pub provenance: Provenance,
}

/// The three artifacts produced for a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Pitch,
    Report,
    Slides,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Pitch, ArtifactKind::Report, ArtifactKind::Slides];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Pitch => "pitch",
            ArtifactKind::Report => "report",
            ArtifactKind::Slides => "slides",
        }
    }

    /// Upstream operation that retrieves this artifact.
    pub fn upstream_operation(&self) -> &'static str {
        match self {
            ArtifactKind::Pitch => "get-elevator-pitch",
            ArtifactKind::Report => "get-market-research-report",
            ArtifactKind::Slides => "get-slides",
        }
    }

    /// Field of the upstream response body holding the artifact.
    pub fn response_field(&self) -> &'static str {
        match self {
            ArtifactKind::Pitch => "elevator_pitch",
            ArtifactKind::Report => "market_research_report",
            ArtifactKind::Slides => "slides",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pitch" => Ok(ArtifactKind::Pitch),
            "report" => Ok(ArtifactKind::Report),
            "slides" => Ok(ArtifactKind::Slides),
            other => Err(format!("unknown artifact kind: {}", other)),
        }
    }
}

/// A retrieved artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactPayload {
    Pitch { text: String },
    Report { markdown: String },
    /// Slides in presentation order, one HTML document each.
    Slides { documents: Vec<String> },
}

impl ArtifactPayload {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactPayload::Pitch { .. } => ArtifactKind::Pitch,
            ArtifactPayload::Report { .. } => ArtifactKind::Report,
            ArtifactPayload::Slides { .. } => ArtifactKind::Slides,
        }
    }
}

/// Why an artifact slot failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ArtifactError {
    /// The upstream service could not be reached or answered with a non-success status.
    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// The upstream answered, but the expected field was missing or mistyped.
    #[error("malformed upstream response: {message}")]
    MalformedResponse { message: String },

    /// The session token was synthesized locally; no upstream job exists for it.
    #[error("no upstream job exists for a fallback token")]
    FallbackToken,

    /// The fetch exceeded its time budget.
    #[error("fetch timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },

    /// The session was cancelled before the fetch completed.
    #[error("fetch cancelled")]
    Cancelled,
}

impl ArtifactError {
    /// Short label used for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            ArtifactError::UpstreamUnavailable { .. } => "upstream_unavailable",
            ArtifactError::MalformedResponse { .. } => "malformed_response",
            ArtifactError::FallbackToken => "fallback_token",
            ArtifactError::TimedOut { .. } => "timed_out",
            ArtifactError::Cancelled => "cancelled",
        }
    }
}

/// Retrieval state of one artifact within a session.
///
/// `Absent -> Pending -> {Present | Failed}`; a new fetch re-enters `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactSlot {
    Absent,
    Pending {
        since: DateTime<Utc>,
    },
    Present {
        payload: ArtifactPayload,
        generated_at: DateTime<Utc>,
    },
    Failed {
        error: ArtifactError,
        failed_at: DateTime<Utc>,
    },
}

impl ArtifactSlot {
    pub fn pending() -> Self {
        ArtifactSlot::Pending { since: Utc::now() }
    }

    pub fn present(payload: ArtifactPayload) -> Self {
        ArtifactSlot::Present {
            payload,
            generated_at: Utc::now(),
        }
    }

    pub fn failed(error: ArtifactError) -> Self {
        ArtifactSlot::Failed {
            error,
            failed_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ArtifactSlot::Pending { .. })
    }

    /// Present or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArtifactSlot::Present { .. } | ArtifactSlot::Failed { .. })
    }

    pub fn payload(&self) -> Option<&ArtifactPayload> {
        match self {
            ArtifactSlot::Present { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ArtifactError> {
        match self {
            ArtifactSlot::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ArtifactSlot::Absent => "absent",
            ArtifactSlot::Pending { .. } => "pending",
            ArtifactSlot::Present { .. } => "present",
            ArtifactSlot::Failed { .. } => "failed",
        }
    }
}

/// The three slots of a session, one per artifact kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSlots {
    pub pitch: ArtifactSlot,
    pub report: ArtifactSlot,
    pub slides: ArtifactSlot,
}

impl ArtifactSlots {
    pub fn get(&self, kind: ArtifactKind) -> &ArtifactSlot {
        match kind {
            ArtifactKind::Pitch => &self.pitch,
            ArtifactKind::Report => &self.report,
            ArtifactKind::Slides => &self.slides,
        }
    }
}

/// Point-in-time view of a generation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub token: GenerationToken,
    pub provenance: Provenance,
    pub repository: RepositoryRef,
    pub created_at: DateTime<Utc>,
    /// Whether the session was cancelled (explicitly or by being superseded).
    pub cancelled: bool,
    pub slots: ArtifactSlots,
}

impl SessionSnapshot {
    pub fn slot(&self, kind: ArtifactKind) -> &ArtifactSlot {
        self.slots.get(kind)
    }

    /// True once every slot is Present or Failed.
    pub fn is_settled(&self) -> bool {
        ArtifactKind::ALL
            .iter()
            .all(|kind| self.slot(*kind).is_terminal())
    }
}

/// Published whenever a slot changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub token: GenerationToken,
    pub kind: ArtifactKind,
    pub slot: ArtifactSlot,
}

/// Session lifecycle transitions, published in the order they happen.
///
/// `Started` precedes every `Slot` update of its token, and `Cancelled`
/// precedes the slot failures it causes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Started {
        token: GenerationToken,
        provenance: Provenance,
        repository: RepositoryRef,
    },
    Slot(SlotUpdate),
    Cancelled { token: GenerationToken },
}

impl GenerationEvent {
    pub fn token(&self) -> &GenerationToken {
        match self {
            GenerationEvent::Started { token, .. } => token,
            GenerationEvent::Slot(update) => &update.token,
            GenerationEvent::Cancelled { token } => token,
        }
    }
}

/// Errors returned by orchestrator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generation session not found: {0}")]
    SessionNotFound(GenerationToken),

    #[error("generation session was cancelled: {0}")]
    SessionCancelled(GenerationToken),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_kind_upstream_mapping() {
        assert_eq!(ArtifactKind::Pitch.upstream_operation(), "get-elevator-pitch");
        assert_eq!(ArtifactKind::Pitch.response_field(), "elevator_pitch");
        assert_eq!(
            ArtifactKind::Report.upstream_operation(),
            "get-market-research-report"
        );
        assert_eq!(ArtifactKind::Report.response_field(), "market_research_report");
        assert_eq!(ArtifactKind::Slides.upstream_operation(), "get-slides");
        assert_eq!(ArtifactKind::Slides.response_field(), "slides");
    }

    #[test]
    fn test_artifact_kind_from_str() {
        assert_eq!("pitch".parse::<ArtifactKind>(), Ok(ArtifactKind::Pitch));
        assert_eq!("Report".parse::<ArtifactKind>(), Ok(ArtifactKind::Report));
        assert_eq!("SLIDES".parse::<ArtifactKind>(), Ok(ArtifactKind::Slides));
        assert!("deck".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn test_slot_serialization_shape() {
        let slot = ArtifactSlot::present(ArtifactPayload::Slides {
            documents: vec!["<html>1</html>".to_string(), "<html>2</html>".to_string()],
        });
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["status"], "present");
        assert_eq!(json["payload"]["kind"], "slides");
        assert_eq!(json["payload"]["documents"][1], "<html>2</html>");

        let failed = ArtifactSlot::failed(ArtifactError::MalformedResponse {
            message: "missing field 'slides'".to_string(),
        });
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["code"], "malformed_response");
    }

    #[test]
    fn test_slot_state_helpers() {
        assert!(!ArtifactSlot::Absent.is_terminal());
        assert!(ArtifactSlot::pending().is_pending());
        assert!(!ArtifactSlot::pending().is_terminal());
        assert!(ArtifactSlot::failed(ArtifactError::Cancelled).is_terminal());

        let present = ArtifactSlot::present(ArtifactPayload::Pitch {
            text: "pitch".to_string(),
        });
        assert!(present.is_terminal());
        assert_eq!(present.payload().map(|p| p.kind()), Some(ArtifactKind::Pitch));
        assert!(present.error().is_none());
    }

    #[test]
    fn test_generation_token_is_transparent() {
        let token = GenerationToken::new("abc123");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"abc123\"");
        assert_eq!(token.to_string(), "abc123");
    }
}
