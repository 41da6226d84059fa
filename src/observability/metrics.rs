//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define guard metrics (admissions, throttling, validation, bootstrap)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `guard_requests_total` (counter): requests by method and status
//! - `guard_request_duration_seconds` (histogram): latency distribution
//! - `guard_rate_limited_total` (counter): throttled requests by policy
//! - `guard_rate_limit_store_entries` (gauge): live fixed-window counters
//! - `guard_validation_failures_total` (counter): rejected payloads by request part
//! - `guard_sanitizer_truncations_total` (counter): values discarded past the depth limit
//! - `guard_connection_attempts_total` (counter): datastore attempts by target and outcome
//! - `guard_uploads_rejected_total` (counter): refused file descriptors by reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder (tests, embedding) every call is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("guard_requests_total", &labels).increment(1);
    histogram!("guard_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(policy: &str) {
    counter!("guard_rate_limited_total", "policy" => policy.to_string()).increment(1);
}

pub fn record_store_entries(entries: usize) {
    gauge!("guard_rate_limit_store_entries").set(entries as f64);
}

pub fn record_validation_failure(part: &str) {
    counter!("guard_validation_failures_total", "part" => part.to_string()).increment(1);
}

pub fn record_sanitizer_truncations(count: usize) {
    counter!("guard_sanitizer_truncations_total").increment(count as u64);
}

pub fn record_connection_attempt(target: &str, outcome: &str) {
    counter!(
        "guard_connection_attempts_total",
        "target" => target.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_upload_rejected(reason: &str) {
    counter!("guard_uploads_rejected_total", "reason" => reason.to_string()).increment(1);
}
