//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default: `0.0.0.0:9090`).
//! Recording functions are no-ops until [`init_metrics`] installs the exporter,
//! so tests and embedders can call them freely.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `sizer_requests_total` - Requests seen by the rate limiter (label: outcome)
//! - `sizer_fetches_total` - Outbound fetches (label: status)
//!
//! ## Histograms
//! - `sizer_fetch_duration_seconds` - Duration of a single outbound fetch
//! - `sizer_batch_urls` - URLs per accepted batch

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "sizer_requests_total";
    pub const FETCHES_TOTAL: &str = "sizer_fetches_total";
    pub const FETCH_DURATION_SECONDS: &str = "sizer_fetch_duration_seconds";
    pub const BATCH_URLS: &str = "sizer_batch_urls";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (e.g., the port is taken
/// or a recorder is already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Requests seen by the rate limiter, by outcome"
    );
    describe_counter!(names::FETCHES_TOTAL, "Outbound fetches, by status");
    describe_histogram!(
        names::FETCH_DURATION_SECONDS,
        "Outbound fetch duration in seconds"
    );
    describe_histogram!(names::BATCH_URLS, "Number of URLs in an accepted batch");

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record what the rate limiter did with a request.
///
/// Outcomes: `accepted`, `rate_limited`, `bad_client_key`.
pub fn record_request_outcome(outcome: &'static str) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record one finished outbound fetch.
pub fn record_fetch(success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "failure" };
    counter!(names::FETCHES_TOTAL, "status" => status).increment(1);
    histogram!(names::FETCH_DURATION_SECONDS, "status" => status).record(duration_secs);
}

/// Record the size of an accepted batch.
pub fn record_batch_size(urls: usize) {
    histogram!(names::BATCH_URLS).record(urls as f64);
}
