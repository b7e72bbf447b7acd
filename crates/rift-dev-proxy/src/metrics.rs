//! Prometheus metrics for rift-dev-proxy.
//!
//! Tracks dispatch decisions, mock reloads and remote sync activity.
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};

lazy_static! {
    /// Dispatch decisions by kind
    pub static ref DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "rift_dev_decisions_total",
        "Total number of dispatch decisions",
        &["decision"]  // decision: mock|preflight|remote|proxy|pass_through
    )
    .unwrap();

    /// Mock table reloads
    pub static ref MOCK_RELOADS_TOTAL: CounterVec = register_counter_vec!(
        "rift_dev_mock_reloads_total",
        "Total number of mock table reload attempts",
        &["result"]  // result: success|error
    )
    .unwrap();

    /// Remote sync cycles
    pub static ref SYNCS_TOTAL: CounterVec = register_counter_vec!(
        "rift_dev_syncs_total",
        "Total number of remote repository sync cycles",
        &["outcome"]  // outcome: done|degraded|empty
    )
    .unwrap();

    /// Individual interface payload fetches
    pub static ref PAYLOAD_FETCHES_TOTAL: CounterVec = register_counter_vec!(
        "rift_dev_payload_fetches_total",
        "Total number of interface payload fetches",
        &["result"]  // result: success|error
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_decision(decision: &str) {
    DECISIONS_TOTAL.with_label_values(&[decision]).inc();
}

pub fn record_mock_reload(success: bool) {
    let result = if success { "success" } else { "error" };
    MOCK_RELOADS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_sync(outcome: &str) {
    SYNCS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_payload_fetch(success: bool) {
    let result = if success { "success" } else { "error" };
    PAYLOAD_FETCHES_TOTAL.with_label_values(&[result]).inc();
}
