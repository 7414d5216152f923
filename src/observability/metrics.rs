//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by pipeline, status
//! - `gateway_request_duration_seconds` (histogram): latency by pipeline
//! - `gateway_reloads_total` (counter): reload cycles by outcome
//! - `gateway_config_version` (gauge): version of the active snapshot
//! - `gateway_policy_rejections_total` (counter): short-circuits by policy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition is opt-in via a listen address

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
pub const RELOADS_TOTAL: &str = "gateway_reloads_total";
pub const CONFIG_VERSION: &str = "gateway_config_version";
pub const POLICY_REJECTIONS_TOTAL: &str = "gateway_policy_rejections_total";

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(pipeline: &str, status: u16, start: Instant) {
    counter!(
        REQUESTS_TOTAL,
        "pipeline" => pipeline.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "pipeline" => pipeline.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_reload(outcome: &'static str) {
    counter!(RELOADS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn set_config_version(version: u64) {
    gauge!(CONFIG_VERSION).set(version as f64);
}

/// Metrics handle given to policy factories.
///
/// Policies only see the operations here, never the recorder itself.
#[derive(Debug, Clone, Default)]
pub struct MetricsSink;

impl MetricsSink {
    pub fn new() -> Self {
        Self
    }

    /// Count a request a policy terminated early.
    pub fn policy_rejection(&self, policy: &'static str) {
        counter!(POLICY_REJECTIONS_TOTAL, "policy" => policy).increment(1);
    }

    /// Count a policy-specific event.
    pub fn policy_event(&self, policy: &'static str, event: &'static str) {
        counter!("gateway_policy_events_total", "policy" => policy, "event" => event)
            .increment(1);
    }
}
