//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define relay metrics (dispatch, scanning, nonces, submissions)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `relay_events_dispatched_total` (counter): handled events by contract, event, path
//! - `relay_handler_errors_total` (counter): handler chain failures
//! - `relay_decode_failures_total` (counter): logs dropped as undecodable
//! - `relay_subscription_restarts_total` (counter): live subscription restarts
//! - `relay_scan_cycles_total` (counter): scan cycles by result
//! - `relay_scan_cycle_duration_seconds` (histogram): scan cycle latency
//! - `relay_nonces_issued_total` (counter): nonce reservations handed out
//! - `relay_sequence_conflicts_total` (counter): broadcasts rejected for nonce drift
//! - `relay_submissions_total` (counter): submission pipeline outcomes
//! - `relay_submit_duration_seconds` (histogram): pipeline latency including retries
//! - `relay_idempotency_total` (counter): idempotency cache hits and misses
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Label cardinality bounded by registered contracts and events

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and register metric descriptions.
///
/// Must run inside a Tokio runtime; the exporter serves scrapes on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(error) => {
            tracing::error!(error = %error, "Failed to install metrics exporter");
        }
    }
}

fn describe_metrics() {
    describe_counter!(
        "relay_events_dispatched_total",
        "Events run through handler chains, by contract, event and delivery path"
    );
    describe_counter!(
        "relay_handler_errors_total",
        "Handler chain invocations that returned an error"
    );
    describe_counter!(
        "relay_decode_failures_total",
        "Matched logs dropped because their payload did not decode"
    );
    describe_counter!(
        "relay_subscription_restarts_total",
        "Live log subscriptions re-established after a failure"
    );
    describe_counter!("relay_scan_cycles_total", "Completed scan cycles by result");
    describe_histogram!(
        "relay_scan_cycle_duration_seconds",
        "Wall time of one scan cycle over every tracked contract"
    );
    describe_counter!("relay_nonces_issued_total", "Nonce reservations handed out");
    describe_counter!(
        "relay_sequence_conflicts_total",
        "Broadcasts rejected because the nonce counter drifted"
    );
    describe_counter!("relay_submissions_total", "Submission pipeline outcomes");
    describe_histogram!(
        "relay_submit_duration_seconds",
        "Submission pipeline latency including conflict retries"
    );
    describe_counter!(
        "relay_idempotency_total",
        "Idempotency cache lookups by result"
    );
}

pub fn record_event_dispatched(contract: &str, event: &str, path: &'static str) {
    counter!(
        "relay_events_dispatched_total",
        "contract" => contract.to_string(),
        "event" => event.to_string(),
        "path" => path,
    )
    .increment(1);
}

pub fn record_handler_error(contract: &str, event: &str) {
    counter!(
        "relay_handler_errors_total",
        "contract" => contract.to_string(),
        "event" => event.to_string(),
    )
    .increment(1);
}

pub fn record_decode_failure(contract: &str, event: &str) {
    counter!(
        "relay_decode_failures_total",
        "contract" => contract.to_string(),
        "event" => event.to_string(),
    )
    .increment(1);
}

pub fn record_subscription_restart(contract: &str) {
    counter!(
        "relay_subscription_restarts_total",
        "contract" => contract.to_string(),
    )
    .increment(1);
}

pub fn record_scan_cycle(success: bool, started: Instant) {
    let result = if success { "ok" } else { "error" };
    counter!("relay_scan_cycles_total", "result" => result).increment(1);
    histogram!("relay_scan_cycle_duration_seconds", "result" => result)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_nonce_issued() {
    counter!("relay_nonces_issued_total").increment(1);
}

pub fn record_sequence_conflict() {
    counter!("relay_sequence_conflicts_total").increment(1);
}

pub fn record_submission(success: bool, started: Instant) {
    let result = if success { "ok" } else { "error" };
    counter!("relay_submissions_total", "result" => result).increment(1);
    histogram!("relay_submit_duration_seconds", "result" => result)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_idempotency(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("relay_idempotency_total", "result" => result).increment(1);
}
