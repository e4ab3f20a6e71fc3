//! Session store: token -> session, with slot update broadcasting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::repository::RepositoryRef;

use super::types::{
    ArtifactError, ArtifactKind, ArtifactSlot, ArtifactSlots, GenerationError, GenerationEvent,
    GenerationToken, IssuedToken, Provenance, SessionSnapshot, SlotUpdate,
};

/// A slot plus the attempt that currently owns it.
#[derive(Debug, Clone)]
struct SlotEntry {
    slot: ArtifactSlot,
    attempt: u64,
}

impl SlotEntry {
    fn absent() -> Self {
        Self {
            slot: ArtifactSlot::Absent,
            attempt: 0,
        }
    }
}

#[derive(Debug)]
struct SessionEntry {
    provenance: Provenance,
    repository: RepositoryRef,
    created_at: DateTime<Utc>,
    cancelled: bool,
    pitch: SlotEntry,
    report: SlotEntry,
    slides: SlotEntry,
}

impl SessionEntry {
    fn slot_mut(&mut self, kind: ArtifactKind) -> &mut SlotEntry {
        match kind {
            ArtifactKind::Pitch => &mut self.pitch,
            ArtifactKind::Report => &mut self.report,
            ArtifactKind::Slides => &mut self.slides,
        }
    }

    fn slot(&self, kind: ArtifactKind) -> &SlotEntry {
        match kind {
            ArtifactKind::Pitch => &self.pitch,
            ArtifactKind::Report => &self.report,
            ArtifactKind::Slides => &self.slides,
        }
    }

    fn snapshot(&self, token: &GenerationToken) -> SessionSnapshot {
        SessionSnapshot {
            token: token.clone(),
            provenance: self.provenance,
            repository: self.repository.clone(),
            created_at: self.created_at,
            cancelled: self.cancelled,
            slots: ArtifactSlots {
                pitch: self.pitch.slot.clone(),
                report: self.report.slot.clone(),
                slides: self.slides.slot.clone(),
            },
        }
    }
}

/// Shared store of generation sessions.
///
/// Every slot write goes through here under one lock, so readers never see a
/// half-written session. Writes are scoped to `(token, kind, attempt)`: a
/// completion for a stale attempt or another token is dropped.
///
/// Events are sent while the write lock is held, so subscribers observe
/// transitions in the order they were applied.
pub struct SessionStore {
    sessions: RwLock<HashMap<GenerationToken, SessionEntry>>,
    events: broadcast::Sender<GenerationEvent>,
}

impl SessionStore {
    /// Create a store whose update channel holds `event_buffer` messages.
    pub fn new(event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            sessions: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.events.subscribe()
    }

    /// Register a new session with all slots Absent.
    ///
    /// Replaces any existing session with the same token.
    #[cfg(test)]
    pub async fn create(&self, issued: &IssuedToken, repository: RepositoryRef) -> SessionSnapshot {
        let entry = SessionEntry {
            provenance: issued.provenance,
            repository,
            created_at: Utc::now(),
            cancelled: false,
            pitch: SlotEntry::absent(),
            report: SlotEntry::absent(),
            slides: SlotEntry::absent(),
        };
        let snapshot = entry.snapshot(&issued.token);

        let mut sessions = self.sessions.write().await;
        if sessions.insert(issued.token.clone(), entry).is_some() {
            debug!(token = %issued.token, "Replaced existing session with same token");
        }
        snapshot
    }

    /// Register a new session with every slot already Pending (attempt 1).
    ///
    /// Returns the snapshot and the attempt to complete for each kind.
    pub async fn open(
        &self,
        issued: &IssuedToken,
        repository: RepositoryRef,
    ) -> (SessionSnapshot, Vec<(ArtifactKind, u64)>) {
        let pending = ArtifactSlot::pending();
        let slot = || SlotEntry {
            slot: pending.clone(),
            attempt: 1,
        };
        let entry = SessionEntry {
            provenance: issued.provenance,
            repository,
            created_at: Utc::now(),
            cancelled: false,
            pitch: slot(),
            report: slot(),
            slides: slot(),
        };
        let snapshot = entry.snapshot(&issued.token);

        let mut sessions = self.sessions.write().await;
        sessions.insert(issued.token.clone(), entry);
        self.send(GenerationEvent::Started {
            token: issued.token.clone(),
            provenance: issued.provenance,
            repository: snapshot.repository.clone(),
        });
        for kind in ArtifactKind::ALL {
            self.publish(&issued.token, kind, pending.clone());
        }

        let attempts = ArtifactKind::ALL.iter().map(|kind| (*kind, 1)).collect();
        (snapshot, attempts)
    }

    /// Move a slot to Pending under a new attempt and return the attempt number.
    pub async fn begin(
        &self,
        token: &GenerationToken,
        kind: ArtifactKind,
    ) -> Result<u64, GenerationError> {
        let pending = ArtifactSlot::pending();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(token)
            .ok_or_else(|| GenerationError::SessionNotFound(token.clone()))?;
        if session.cancelled {
            return Err(GenerationError::SessionCancelled(token.clone()));
        }
        let entry = session.slot_mut(kind);
        entry.attempt += 1;
        entry.slot = pending.clone();
        let attempt = entry.attempt;

        self.publish(token, kind, pending);
        Ok(attempt)
    }

    /// Write a fetch result. Returns false (and writes nothing) if the
    /// session is gone, the slot is no longer Pending, or `attempt` is stale.
    pub async fn complete(
        &self,
        token: &GenerationToken,
        kind: ArtifactKind,
        attempt: u64,
        slot: ArtifactSlot,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(token) else {
            return false;
        };
        let entry = session.slot_mut(kind);
        if entry.attempt != attempt || !entry.slot.is_pending() {
            debug!(
                token = %token,
                kind = %kind,
                attempt = attempt,
                current = entry.attempt,
                "Dropping stale artifact completion"
            );
            return false;
        }
        entry.slot = slot.clone();

        self.publish(token, kind, slot);
        true
    }

    /// Mark a session cancelled; Pending slots become Failed(Cancelled).
    pub async fn cancel(&self, token: &GenerationToken) -> Result<SessionSnapshot, GenerationError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(token)
            .ok_or_else(|| GenerationError::SessionNotFound(token.clone()))?;
        session.cancelled = true;
        self.send(GenerationEvent::Cancelled {
            token: token.clone(),
        });

        for kind in ArtifactKind::ALL {
            let entry = session.slot_mut(kind);
            if entry.slot.is_pending() {
                entry.slot = ArtifactSlot::failed(ArtifactError::Cancelled);
                self.publish(token, kind, entry.slot.clone());
            }
        }
        Ok(session.snapshot(token))
    }

    pub async fn snapshot(&self, token: &GenerationToken) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.get(token).map(|session| session.snapshot(token))
    }

    pub async fn slot(&self, token: &GenerationToken, kind: ArtifactKind) -> Option<ArtifactSlot> {
        let sessions = self.sessions.read().await;
        sessions.get(token).map(|session| session.slot(kind).slot.clone())
    }

    /// Provenance and cancellation flag of a session.
    pub async fn issued(&self, token: &GenerationToken) -> Option<(IssuedToken, bool)> {
        let sessions = self.sessions.read().await;
        sessions.get(token).map(|session| {
            (
                IssuedToken {
                    token: token.clone(),
                    provenance: session.provenance,
                },
                session.cancelled,
            )
        })
    }

    /// Number of known sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn publish(&self, token: &GenerationToken, kind: ArtifactKind, slot: ArtifactSlot) {
        self.send(GenerationEvent::Slot(SlotUpdate {
            token: token.clone(),
            kind,
            slot,
        }));
    }

    fn send(&self, event: GenerationEvent) {
        // A send error only means nobody is subscribed
        let _ = self.events.send(event);
    }
}
