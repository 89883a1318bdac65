//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by route, status
//! - `relay_request_duration_seconds` (histogram): latency by route
//! - `relay_trace_reconciled_total` (counter): propagator outcomes
//! - `relay_queue_enqueued_total` (counter): accepted messages by queue
//! - `relay_queue_delivered_total` (counter): deliveries by queue, outcome
//! - `relay_queue_dead_lettered_total` (counter): dead-lettered messages
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "relay_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_reconciliation(outcome: &'static str) {
    counter!("relay_trace_reconciled_total", "outcome" => outcome).increment(1);
}

pub fn record_enqueued(queue: &str) {
    counter!("relay_queue_enqueued_total", "queue" => queue.to_string()).increment(1);
}

pub fn record_delivered(queue: &str, outcome: &'static str) {
    counter!(
        "relay_queue_delivered_total",
        "queue" => queue.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_dead_lettered(queue: &str) {
    counter!("relay_queue_dead_lettered_total", "queue" => queue.to_string()).increment(1);
}
