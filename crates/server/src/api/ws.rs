//! WebSocket stream of generation progress.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use pitchforge_core::{
    ArtifactKind, ArtifactSlot, GenerationEvent, GenerationToken, Provenance, RepositoryRef,
    SlotUpdate,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket message sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// A generation session was opened; all slots are pending.
    GenerationStarted {
        token: GenerationToken,
        provenance: Provenance,
        repository: RepositoryRef,
    },
    /// One artifact slot changed.
    SlotUpdate {
        token: GenerationToken,
        kind: ArtifactKind,
        slot: ArtifactSlot,
    },
    /// A session was cancelled.
    GenerationCancelled { token: GenerationToken },
}

impl WsMessage {
    fn type_label(&self) -> &'static str {
        match self {
            WsMessage::GenerationStarted { .. } => "generation_started",
            WsMessage::SlotUpdate { .. } => "slot_update",
            WsMessage::GenerationCancelled { .. } => "generation_cancelled",
        }
    }
}

impl From<SlotUpdate> for WsMessage {
    fn from(update: SlotUpdate) -> Self {
        WsMessage::SlotUpdate {
            token: update.token,
            kind: update.kind,
            slot: update.slot,
        }
    }
}

impl From<GenerationEvent> for WsMessage {
    fn from(event: GenerationEvent) -> Self {
        match event {
            GenerationEvent::Started {
                token,
                provenance,
                repository,
            } => WsMessage::GenerationStarted {
                token,
                provenance,
                repository,
            },
            GenerationEvent::Slot(update) => update.into(),
            GenerationEvent::Cancelled { token } => WsMessage::GenerationCancelled { token },
        }
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, msg: WsMessage) {
        // No receivers just means no client is connected
        let _ = self.sender.send(msg);
    }

    /// Subscribe to receive messages.
    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    /// Forward orchestrator events to connected clients, in order, until the
    /// orchestrator's channel closes.
    pub fn relay_events(&self, mut events: broadcast::Receiver<GenerationEvent>) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => broadcaster.broadcast(event.into()),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Generation event relay lagged, skipped {} events", n);
                        WS_LAG_EVENTS.inc();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Generation event channel closed");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    WS_MESSAGES_SENT.with_label_values(&[msg.type_label()]).inc();

                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, client disconnected");
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize WsMessage: {}", e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged, skipped {} messages", n);
                    WS_LAG_EVENTS.inc();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Clients only listen; inbound traffic is close/ping
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Ignoring client text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}
