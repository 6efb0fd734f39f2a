//! Prometheus metrics for the status service.
//!
//! - HTTP request metrics (latency, counts, in flight)
//! - Scene transitions applied through the API, by target status
//! - Completed orders
//! - Scenes by current status (collected when scraped)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use tracing::warn;

use reprocess_core::status::StatusStore;
use reprocess_core::SceneStatus;

use crate::state::AppState;

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
            "reprocess_http_request_duration_seconds",
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
        Opts::new("reprocess_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reprocess_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Scene and Order Metrics
// =============================================================================

/// Scenes by current status (collected dynamically).
pub static SCENES_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("reprocess_scenes_by_status", "Current scene count by status"),
        &["status"],
    )
    .unwrap()
});

/// Scene transitions applied, by target status.
pub static SCENE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reprocess_scene_transitions_total",
            "Scene transitions applied through the API",
        ),
        &["to_status"],
    )
    .unwrap()
});

/// Scene transitions refused by the transition table.
pub static SCENE_TRANSITIONS_REFUSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reprocess_scene_transitions_refused_total",
            "Scene transitions refused because the edge is not permitted",
        ),
        &["to_status"],
    )
    .unwrap()
});

/// Orders completed and announced.
pub static ORDERS_COMPLETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "reprocess_orders_completed_total",
        "Orders completed and announced to their submitter",
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

    // Scenes and orders
    registry
        .register(Box::new(SCENES_BY_STATUS.clone()))
        .unwrap();
    registry
        .register(Box::new(SCENE_TRANSITIONS.clone()))
        .unwrap();
    registry
        .register(Box::new(SCENE_TRANSITIONS_REFUSED.clone()))
        .unwrap();
    registry
        .register(Box::new(ORDERS_COMPLETED_TOTAL.clone()))
        .unwrap();
}

/// Record the outcome of a transition request.
pub fn record_transition(to: SceneStatus, applied: bool) {
    let label = [to.as_str()];
    if applied {
        SCENE_TRANSITIONS.with_label_values(&label).inc();
    } else {
        SCENE_TRANSITIONS_REFUSED.with_label_values(&label).inc();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Refresh gauges from the store before a scrape.
pub fn collect_dynamic_metrics(state: &AppState) {
    match state.service().store().count_scenes_by_status() {
        Ok(counts) => {
            for status in SceneStatus::ALL {
                let count = counts
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map(|(_, n)| *n)
                    .unwrap_or(0);
                SCENES_BY_STATUS
                    .with_label_values(&[status.as_str()])
                    .set(count);
            }
        }
        Err(e) => warn!(error = %e, "Failed to count scenes for metrics"),
    }
}

/// Normalize a path for metric labels (order and scene ids become placeholders).
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let mut normalized = Vec::with_capacity(segments.len());
    let mut previous = "";
    for segment in segments {
        let replaced = match previous {
            "orders" if !matches!(segment, "finalize" | "") => "{order_id}",
            "scenes" if !matches!(segment, "to-process" | "to-retry" | "to-purge" | "queue" | "reconcile" | "") => {
                "{scene_id}"
            }
            "configuration" if !segment.is_empty() => "{key}",
            _ => segment,
        };
        normalized.push(replaced);
        previous = segment;
    }
    normalized.join("/")
}
