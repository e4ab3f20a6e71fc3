use std::sync::Arc;

use pitchforge_core::{Config, GenerationOrchestrator, SanitizedConfig};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<GenerationOrchestrator>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    /// Build the state and start relaying generation events to WebSocket clients.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: Config,
        orchestrator: Arc<GenerationOrchestrator>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        ws_broadcaster.relay_events(orchestrator.subscribe());
        Self {
            config,
            orchestrator,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
