//! Generation API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use pitchforge_core::{
    parse_repository_url, ArtifactKind, ArtifactSlot, GenerationError, GenerationToken,
    SessionSnapshot,
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a generation
#[derive(Debug, Deserialize)]
pub struct StartGenerationBody {
    /// Repository URL, e.g. `https://github.com/owner/repo`
    pub repository_url: String,
    /// Token of a generation this one replaces
    pub supersedes: Option<String>,
}

/// Response for a single artifact
#[derive(Debug, Serialize)]
pub struct ArtifactResponse {
    pub token: GenerationToken,
    pub kind: ArtifactKind,
    pub slot: ArtifactSlot,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct GenerationErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<GenerationErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(GenerationErrorResponse {
            error: error.into(),
        }),
    )
}

fn not_found(token: &GenerationToken) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        format!("Generation not found: {}", token),
    )
}

fn from_generation_error(e: GenerationError) -> ApiError {
    match e {
        GenerationError::SessionNotFound(token) => not_found(&token),
        GenerationError::SessionCancelled(_) => api_error(StatusCode::CONFLICT, e.to_string()),
    }
}

fn parse_kind(kind: &str) -> Result<ArtifactKind, ApiError> {
    kind.parse::<ArtifactKind>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a generation for a repository
pub async fn start_generation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartGenerationBody>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let repository = parse_repository_url(&body.repository_url)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let previous = body.supersedes.map(GenerationToken::new);
    let snapshot = state
        .orchestrator()
        .start_superseding(repository, previous.as_ref())
        .await;

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Get a generation session by token
pub async fn get_generation(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let token = GenerationToken::new(token);
    state
        .orchestrator()
        .session(&token)
        .await
        .map(Json)
        .ok_or_else(|| not_found(&token))
}

/// Cancel a generation session (DELETE endpoint)
pub async fn cancel_generation(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let token = GenerationToken::new(token);
    let snapshot = state
        .orchestrator()
        .cancel(&token)
        .await
        .map_err(from_generation_error)?;

    info!(token = %token, "Generation cancelled via API");
    Ok(Json(snapshot))
}

/// Get one artifact slot of a session
pub async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Path((token, kind)): Path<(String, String)>,
) -> Result<Json<ArtifactResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    let token = GenerationToken::new(token);
    let slot = state
        .orchestrator()
        .artifact(&token, kind)
        .await
        .ok_or_else(|| not_found(&token))?;

    Ok(Json(ArtifactResponse { token, kind, slot }))
}

/// Re-fetch one artifact slot
pub async fn refetch_artifact(
    State(state): State<Arc<AppState>>,
    Path((token, kind)): Path<(String, String)>,
) -> Result<(StatusCode, Json<ArtifactResponse>), ApiError> {
    let kind = parse_kind(&kind)?;
    let token = GenerationToken::new(token);
    let slot = state
        .orchestrator()
        .refetch(&token, kind)
        .await
        .map_err(from_generation_error)?;

    Ok((StatusCode::ACCEPTED, Json(ArtifactResponse { token, kind, slot })))
}
