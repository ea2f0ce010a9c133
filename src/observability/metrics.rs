//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, route
//! - `proxy_request_duration_seconds` (histogram): time to response head
//! - `proxy_in_flight_requests` (gauge): requests not yet completed
//! - `proxy_outcomes_total` (counter): terminal states by state
//! - `proxy_request_lifetime_seconds` (histogram): start to terminal state
//!
//! Without an installed recorder the macros are no-ops, so library users
//! and tests pay nothing.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::forward::inflight::CompletionState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a response handed back to the client.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    metrics::counter!("proxy_requests_total", &labels).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn in_flight_started() {
    metrics::gauge!("proxy_in_flight_requests").increment(1.0);
}

/// Record a request reaching its terminal state.
pub fn record_completion(state: CompletionState, lifetime: Duration) {
    metrics::gauge!("proxy_in_flight_requests").decrement(1.0);
    metrics::counter!("proxy_outcomes_total", "state" => state.as_str()).increment(1);
    metrics::histogram!("proxy_request_lifetime_seconds", "state" => state.as_str())
        .record(lifetime.as_secs_f64());
}
