//! Fan-out orchestrator.
//!
//! Issues a token for a repository, then retrieves the pitch, report and
//! slides as three independent tasks. Each task writes its own slot in the
//! session store when it finishes; nothing waits for all three.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::repository::RepositoryRef;
use crate::upstream::ProcessingService;

use super::fetcher::ArtifactFetcher;
use super::issuer::TokenIssuer;
use super::session::SessionStore;
use super::types::{
    ArtifactKind, ArtifactSlot, GenerationError, GenerationEvent, GenerationToken, IssuedToken,
    SessionSnapshot,
};

/// In-flight fetch tasks of one session, by kind.
type SessionTasks = HashMap<ArtifactKind, AbortHandle>;

/// Drives generation sessions from token issuance to artifact retrieval.
pub struct GenerationOrchestrator {
    config: GenerationConfig,
    issuer: TokenIssuer,
    fetcher: Arc<ArtifactFetcher>,
    store: Arc<SessionStore>,
    tasks: RwLock<HashMap<GenerationToken, SessionTasks>>,
}

impl GenerationOrchestrator {
    /// Create a new orchestrator backed by `service`.
    pub fn new(service: Arc<dyn ProcessingService>, config: GenerationConfig) -> Self {
        let fetcher = ArtifactFetcher::new(Arc::clone(&service), &config);
        Self::with_fetcher(service, config, fetcher)
    }

    /// Create an orchestrator with an explicit per-fetch budget.
    pub fn with_fetch_timeout(
        service: Arc<dyn ProcessingService>,
        config: GenerationConfig,
        timeout: Duration,
    ) -> Self {
        let fetcher = ArtifactFetcher::new(Arc::clone(&service), &config).with_fetch_timeout(timeout);
        Self::with_fetcher(service, config, fetcher)
    }

    fn with_fetcher(
        service: Arc<dyn ProcessingService>,
        config: GenerationConfig,
        fetcher: ArtifactFetcher,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(service),
            fetcher: Arc::new(fetcher),
            store: Arc::new(SessionStore::new(config.event_buffer)),
            tasks: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Start a generation for `repository`.
    ///
    /// Returns once the token is issued; all three slots are Pending in the
    /// returned snapshot and complete independently afterwards.
    pub async fn start(&self, repository: RepositoryRef) -> SessionSnapshot {
        let issued = self.issuer.issue(&repository).await;
        info!(
            token = %issued.token,
            provenance = issued.provenance.as_str(),
            repository = %repository,
            "Generation started"
        );

        let (snapshot, attempts) = self.store.open(&issued, repository).await;
        for (kind, attempt) in attempts {
            self.spawn_fetch(issued.clone(), kind, attempt).await;
        }
        snapshot
    }

    /// Start a new generation that replaces `previous`.
    ///
    /// When `generation.cancel_superseded` is set, the previous session's
    /// outstanding fetches are aborted. Its results can never reach the new
    /// session either way, since writes are keyed by token.
    pub async fn start_superseding(
        &self,
        repository: RepositoryRef,
        previous: Option<&GenerationToken>,
    ) -> SessionSnapshot {
        if let Some(previous) = previous {
            if self.config.cancel_superseded {
                match self.cancel(previous).await {
                    Ok(_) => info!(token = %previous, "Cancelled superseded generation"),
                    Err(e) => debug!("Nothing to supersede: {}", e),
                }
            }
        }
        self.start(repository).await
    }

    /// Re-fetch a single artifact. The slot re-enters Pending immediately.
    pub async fn refetch(
        &self,
        token: &GenerationToken,
        kind: ArtifactKind,
    ) -> Result<ArtifactSlot, GenerationError> {
        let (issued, cancelled) = self
            .store
            .issued(token)
            .await
            .ok_or_else(|| GenerationError::SessionNotFound(token.clone()))?;
        if cancelled {
            return Err(GenerationError::SessionCancelled(token.clone()));
        }

        let attempt = self.store.begin(token, kind).await?;
        info!(token = %token, kind = %kind, attempt = attempt, "Re-fetching artifact");

        // Read before spawning so the caller sees the Pending state it caused
        let slot = self
            .store
            .slot(token, kind)
            .await
            .unwrap_or_else(ArtifactSlot::pending);
        self.spawn_fetch(issued, kind, attempt).await;
        Ok(slot)
    }

    /// Cancel a session: abort its in-flight fetches and fail Pending slots.
    pub async fn cancel(&self, token: &GenerationToken) -> Result<SessionSnapshot, GenerationError> {
        if let Some(handles) = self.tasks.write().await.remove(token) {
            for handle in handles.values() {
                handle.abort();
            }
        }
        self.store.cancel(token).await
    }

    /// Cancel every session with fetches still in flight.
    pub async fn shutdown(&self) {
        let tokens: Vec<GenerationToken> = self.tasks.read().await.keys().cloned().collect();
        info!(sessions = tokens.len(), "Shutting down generation orchestrator");
        join_all(tokens.iter().map(|token| self.cancel(token))).await;
    }

    pub async fn session(&self, token: &GenerationToken) -> Option<SessionSnapshot> {
        self.store.snapshot(token).await
    }

    pub async fn artifact(&self, token: &GenerationToken, kind: ArtifactKind) -> Option<ArtifactSlot> {
        self.store.slot(token, kind).await
    }

    /// Subscribe to session and slot transitions across all sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.store.subscribe()
    }

    /// Number of sessions with at least one fetch in flight.
    pub async fn active_sessions(&self) -> usize {
        let mut tasks = self.tasks.write().await;
        prune_finished(&mut tasks);
        tasks.len()
    }

    /// Number of sessions known to the store.
    pub async fn session_count(&self) -> usize {
        self.store.count().await
    }

    async fn spawn_fetch(&self, issued: IssuedToken, kind: ArtifactKind, attempt: u64) {
        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(&self.store);
        let token = issued.token.clone();

        // Hold the task map while spawning so a concurrent cancel either sees
        // this handle or runs before the task exists.
        let mut tasks = self.tasks.write().await;
        let handle = tokio::spawn(async move {
            let slot = fetcher.fetch(&issued, kind).await;
            store.complete(&issued.token, kind, attempt, slot).await;
        });

        prune_finished(&mut tasks);
        if let Some(previous) = tasks
            .entry(token)
            .or_default()
            .insert(kind, handle.abort_handle())
        {
            // A re-fetch replaces the earlier attempt
            previous.abort();
        }
    }
}

fn prune_finished(tasks: &mut HashMap<GenerationToken, SessionTasks>) {
    tasks.retain(|_, handles| {
        handles.retain(|_, handle| !handle.is_finished());
        !handles.is_empty()
    });
}
