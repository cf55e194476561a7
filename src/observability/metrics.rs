//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count RPC calls, applies and rollbacks
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `haproxy_manager_rpc_requests_total` (counter): calls by method, outcome
//! - `haproxy_manager_rpc_duration_seconds` (histogram): call latency by method
//! - `haproxy_manager_applies_total` (counter): applies by outcome
//! - `haproxy_manager_apply_duration_seconds` (histogram): apply latency
//! - `haproxy_manager_rollbacks_total` (counter): rollbacks by outcome
//! - `haproxy_manager_registry_services` (gauge): registered services
//! - `haproxy_manager_registry_persist_failures_total` (counter): failed state file writes
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed, so tests need no setup
//! - Labels are fixed, low-cardinality strings

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rpc(method: &'static str, outcome: &'static str, latency: Duration) {
    metrics::counter!(
        "haproxy_manager_rpc_requests_total",
        "method" => method,
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("haproxy_manager_rpc_duration_seconds", "method" => method)
        .record(latency.as_secs_f64());
}

pub fn record_apply(outcome: &'static str, latency: Duration) {
    metrics::counter!("haproxy_manager_applies_total", "outcome" => outcome).increment(1);
    metrics::histogram!("haproxy_manager_apply_duration_seconds").record(latency.as_secs_f64());
}

pub fn record_rollback(outcome: &'static str) {
    metrics::counter!("haproxy_manager_rollbacks_total", "outcome" => outcome).increment(1);
}

pub fn record_registry_size(services: usize) {
    metrics::gauge!("haproxy_manager_registry_services").set(services as f64);
}

pub fn record_persist_failure() {
    metrics::counter!("haproxy_manager_registry_persist_failures_total").increment(1);
}
