//! Generation orchestration.
//!
//! A generation turns a repository into three artifacts produced by the
//! upstream processing service:
//! - **Token issuance**: start-processing, with a fallback token on failure
//! - **Fan-out**: pitch, report and slides are fetched concurrently
//! - **Session state**: each slot is written as its fetch completes

mod fetcher;
mod issuer;
mod orchestrator;
mod session;
mod types;

pub use fetcher::{ArtifactFetcher, PITCH_PLACEHOLDER};
pub use issuer::{fallback_token, TokenIssuer, FALLBACK_PREFIX};
pub use orchestrator::GenerationOrchestrator;
pub use session::SessionStore;
pub use types::*;
