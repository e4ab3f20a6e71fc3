//! Repository identification.
//!
//! Turns a user-supplied repository URL into a `RepositoryRef` that the
//! generation orchestrator submits to the upstream processing service.

mod parser;

pub use parser::parse_repository_url;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A source repository submitted for generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Account or organization that owns the repository.
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// The URL exactly as submitted (trimmed).
    pub source_url: String,
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Errors produced when parsing a repository URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid repository URL '{0}': expected a path of the form <owner>/<repo>")]
    InvalidUrl(String),
}
