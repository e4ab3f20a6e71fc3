//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Upstream processing service calls
//! - Token issuance (upstream vs fallback)
//! - Artifact slot outcomes

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Upstream Metrics
// =============================================================================

/// Upstream requests total by operation and result.
pub static UPSTREAM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pitchforge_upstream_requests_total",
            "Total requests to the processing service",
        ),
        &["operation", "result"], // "success", "http_error", "connection_error", "timeout", "malformed"
    )
    .unwrap()
});

/// Upstream request duration in seconds.
pub static UPSTREAM_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pitchforge_upstream_request_duration_seconds",
            "Duration of processing service requests",
        )
        .buckets(vec![0.05, 0.25, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Generation Metrics
// =============================================================================

/// Tokens issued by provenance.
pub static TOKENS_ISSUED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pitchforge_tokens_issued_total", "Generation tokens issued"),
        &["provenance"], // "upstream", "fallback"
    )
    .unwrap()
});

/// Terminal slot outcomes by artifact kind.
pub static SLOT_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pitchforge_slot_outcomes_total",
            "Artifact fetch outcomes",
        ),
        &["kind", "outcome"], // "present", "placeholder", or an error code
    )
    .unwrap()
});

/// Artifact fetches currently in flight.
pub static FETCHES_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pitchforge_fetches_in_flight",
        "Artifact fetches currently in flight",
    )
    .unwrap()
});

/// Increments a gauge on creation and decrements it on drop.
///
/// Holding one across an await keeps the gauge balanced when the enclosing
/// task is aborted mid-flight.
pub struct InFlightGuard<'a> {
    gauge: &'a IntGauge,
}

impl<'a> InFlightGuard<'a> {
    pub fn new(gauge: &'a IntGauge) -> Self {
        gauge.inc();
        Self { gauge }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// All core metrics, for registration in the server's registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(UPSTREAM_REQUESTS.clone()),
        Box::new(UPSTREAM_REQUEST_DURATION.clone()),
        Box::new(TOKENS_ISSUED.clone()),
        Box::new(SLOT_OUTCOMES.clone()),
        Box::new(FETCHES_IN_FLIGHT.clone()),
    ]
}
