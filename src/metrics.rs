//! Prometheus metrics for the launcher and the HTTP handler
//!
//! Registered in the default registry; `/metrics` on the handler serves them.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter_vec, CounterVec, Encoder,
    Histogram, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Launch Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Launch attempts by outcome.
    ///
    /// Labels:
    /// - outcome: "launched", "validation_error", "randomness_error" or "provisioning_error"
    pub static ref LAUNCHES_TOTAL: CounterVec = register_counter_vec!(
        "runbatch_launches_total",
        "Job launch attempts by outcome",
        &["outcome"]
    ).expect("failed to register LAUNCHES_TOTAL metric");

    /// Time from request to accepted (or failed) instance creation.
    pub static ref LAUNCH_DURATION: Histogram = register_histogram!(
        "runbatch_launch_duration_seconds",
        "Time spent validating a job and creating its instance",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).expect("failed to register LAUNCH_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Handler Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// HTTP launch requests by response status code.
    pub static ref HANDLER_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "runbatch_handler_requests_total",
        "Launch requests served over HTTP by status code",
        &["status"]
    ).expect("failed to register HANDLER_REQUESTS_TOTAL metric");
}

/// Encode every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
