//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Bundle lifecycle (creation, stage transitions, failures)
//! - Webhook deliveries and fan-in verdicts
//! - External services (analyzer, generators, renderer, reviewer)
//! - The stuck-job sweeper

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Bundle lifecycle
// =============================================================================

/// Bundles created total.
pub static BUNDLES_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("reelforge_bundles_created_total", "Total bundles created").unwrap()
});

/// Stage transitions by target stage.
pub static STAGE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_stage_transitions_total",
            "Bundle stage transitions by target stage",
        ),
        &["stage"],
    )
    .unwrap()
});

/// Bundle failures by failure kind.
pub static BUNDLES_FAILED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_bundles_failed_total", "Bundles that reached Failed"),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Webhooks and fan-in
// =============================================================================

/// Webhook deliveries by job class and outcome.
pub static WEBHOOK_DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_webhook_deliveries_total", "Inbound webhook deliveries"),
        &["class", "outcome"], // outcome: "processed", "already_processed", "not_found", "unauthorized", "malformed"
    )
    .unwrap()
});

/// Fan-in evaluations by job class and verdict.
pub static FAN_IN_VERDICTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_fan_in_verdicts_total", "Fan-in gate evaluations"),
        &["class", "outcome"],
    )
    .unwrap()
});

// =============================================================================
// External services
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelforge_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelforge_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Sweeper
// =============================================================================

/// Jobs marked failed by the sweeper, by job class.
pub static JOBS_SWEPT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_jobs_swept_total", "Stuck jobs failed by the sweeper"),
        &["class"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Record one external call.
pub fn record_external_call(service: &str, operation: &str, success: bool, elapsed_secs: f64) {
    EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, operation])
        .observe(elapsed_secs);
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, if success { "success" } else { "error" }])
        .inc();
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Lifecycle
        Box::new(BUNDLES_CREATED.clone()),
        Box::new(STAGE_TRANSITIONS.clone()),
        Box::new(BUNDLES_FAILED.clone()),
        // Webhooks
        Box::new(WEBHOOK_DELIVERIES.clone()),
        Box::new(FAN_IN_VERDICTS.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
        // Sweeper
        Box::new(JOBS_SWEPT.clone()),
    ]
}
