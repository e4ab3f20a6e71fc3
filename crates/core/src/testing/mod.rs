//! Testing utilities and mock implementations.
//!
//! Provides a mock processing service so the orchestrator and the HTTP API
//! can be exercised without a running upstream.
//!
//! # Example
//!
//! ```rust,ignore
//! use pitchforge_core::testing::{fixtures, MockArtifact, MockProcessingService};
//!
//! let service = MockProcessingService::new();
//! service
//!     .set_artifact(ArtifactKind::Report, MockArtifact::body(json!({})))
//!     .await;
//! service
//!     .set_artifact_delay(ArtifactKind::Slides, Duration::from_millis(200))
//!     .await;
//! ```

mod mock_processing;

pub use mock_processing::{MockArtifact, MockProcessingService, MockResponse, RecordedFetch};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::generation::ArtifactPayload;
    use crate::repository::RepositoryRef;

    /// Create a GitHub repository reference.
    pub fn repository(owner: &str, name: &str) -> RepositoryRef {
        RepositoryRef {
            owner: owner.to_string(),
            name: name.to_string(),
            source_url: format!("https://github.com/{}/{}", owner, name),
        }
    }

    /// A plausible elevator pitch.
    pub fn pitch() -> ArtifactPayload {
        ArtifactPayload::Pitch {
            text: "A declarative UI library that makes interactive interfaces painless."
                .to_string(),
        }
    }

    /// A short markdown market research report.
    pub fn report() -> ArtifactPayload {
        ArtifactPayload::Report {
            markdown: "# Market Research\n\n## Audience\n\nFrontend developers.\n".to_string(),
        }
    }

    /// A deck of `count` single-slide HTML documents.
    pub fn slides(count: usize) -> ArtifactPayload {
        ArtifactPayload::Slides {
            documents: (1..=count)
                .map(|i| format!("<html><body><h1>Slide {}</h1></body></html>", i))
                .collect(),
        }
    }
}
