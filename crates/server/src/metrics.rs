//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the pitchforge server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket connection metrics
//! - Generation session gauges (collected dynamically)
//! - Core metrics (upstream calls, token issuance, slot outcomes)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pitchforge_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pitchforge_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pitchforge_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pitchforge_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pitchforge_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pitchforge_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when a receiver falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pitchforge_ws_lag_events_total",
        "WebSocket lag events (receiver fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Generation Metrics (collected dynamically)
// =============================================================================

/// Sessions known to the session store.
pub static GENERATION_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pitchforge_generation_sessions",
        "Number of generation sessions held in memory",
    )
    .unwrap()
});

/// Sessions with at least one fetch in flight.
pub static GENERATION_SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pitchforge_generation_sessions_active",
        "Number of generation sessions with fetches in flight",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Generation
    registry
        .register(Box::new(GENERATION_SESSIONS.clone()))
        .unwrap();
    registry
        .register(Box::new(GENERATION_SESSIONS_ACTIVE.clone()))
        .unwrap();

    // Core metrics (upstream, issuance, slot outcomes)
    for metric in pitchforge_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let orchestrator = state.orchestrator();
    GENERATION_SESSIONS.set(orchestrator.session_count().await as i64);
    GENERATION_SESSIONS_ACTIVE.set(orchestrator.active_sessions().await as i64);
}

/// Normalize a path for metric labels (replace tokens with a placeholder).
///
/// Generation tokens are unbounded, so the segment following `generations`
/// is collapsed to `{token}`.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = Vec::new();
    let mut after_generations = false;
    for segment in path.split('/') {
        if after_generations && !segment.is_empty() {
            normalized.push("{token}");
        } else {
            normalized.push(segment);
        }
        after_generations = segment == "generations";
    }
    normalized.join("/")
}
