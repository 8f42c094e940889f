//! Prometheus metrics for proxy observability.
//!
//! Metrics are exposed on a dedicated listener when `METRICS_PORT` is set.
//! Recording functions are safe to call without an installed exporter; the
//! values are simply discarded.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `proxy_requests_total` - Completed inbound requests (labels: method, status)
//! - `proxy_rejections_total` - Requests answered without a relayed upstream response (label: reason)
//! - `proxy_upstream_errors_total` - Upstream transport failures (label: kind)
//! - `proxy_relay_failures_total` - Upstream bodies that broke mid-relay
//!
//! ## Histograms
//! - `proxy_request_duration_seconds` - Inbound request duration (labels: method, status)

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "proxy_requests_total";
    pub const REJECTIONS_TOTAL: &str = "proxy_rejections_total";
    pub const UPSTREAM_ERRORS_TOTAL: &str = "proxy_upstream_errors_total";
    pub const RELAY_FAILURES_TOTAL: &str = "proxy_relay_failures_total";
    pub const REQUEST_DURATION_SECONDS: &str = "proxy_request_duration_seconds";
}

/// Initialize the Prometheus metrics exporter on `metrics_addr`.
///
/// # Errors
///
/// Returns a message if the exporter or its listener cannot be installed.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(names::REQUESTS_TOTAL, "Total number of completed inbound requests");
    describe_counter!(
        names::REJECTIONS_TOTAL,
        "Requests answered by the proxy itself instead of relaying the upstream"
    );
    describe_counter!(
        names::UPSTREAM_ERRORS_TOTAL,
        "Total number of upstream transport failures"
    );
    describe_counter!(
        names::RELAY_FAILURES_TOTAL,
        "Upstream response bodies that failed while being relayed"
    );
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "Inbound request duration in seconds"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record one completed inbound request.
pub fn record_request(method: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    counter!(names::REQUESTS_TOTAL, "method" => method.to_string(), "status" => status.clone())
        .increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS, "method" => method.to_string(), "status" => status)
        .record(duration_secs);
}

/// Record a request the proxy answered itself.
pub fn record_rejection(reason: &'static str) {
    counter!(names::REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Record an upstream transport failure.
pub fn record_upstream_error(kind: &'static str) {
    counter!(names::UPSTREAM_ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Record an upstream body that broke while being relayed.
pub fn record_relay_failure() {
    counter!(names::RELAY_FAILURES_TOTAL).increment(1);
}
