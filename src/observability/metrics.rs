//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_short_circuits_total` (counter): terminal responses by transformer, phase
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade; without an
//!   installed recorder they are no-ops (tests, embedded use)
//! - Labels carry the route pattern, never the raw path

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::transform::Phase;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_counter!("gateway_requests_total", "Total requests handled by the gateway");
            describe_histogram!(
                "gateway_request_duration_seconds",
                "Request duration in seconds, including the upstream call"
            );
            describe_counter!(
                "gateway_short_circuits_total",
                "Responses produced by a transformer instead of the upstream"
            );
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_short_circuit(transformer: &'static str, phase: Phase) {
    counter!(
        "gateway_short_circuits_total",
        "transformer" => transformer,
        "phase" => phase.to_string()
    )
    .increment(1);
}
