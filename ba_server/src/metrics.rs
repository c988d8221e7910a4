//! Prometheus metrics for the authentication service.
//!
//! When `METRICS_BIND` is set the exporter serves
//! `http://<addr>/metrics` in Prometheus text format. Without an installed
//! exporter the recording functions are no-ops.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts and durations by method, path, status
//! - **Auth Metrics**: Login attempts, sessions issued, refresh rejections,
//!   magic links issued and purged
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use ba_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::login_attempts_total("password", "success");
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// # Arguments
///
/// - `addr`: Address to bind the metrics server to (e.g., `0.0.0.0:9090`)
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Record a login attempt by method (`password`, `magic_link`) and outcome.
pub fn login_attempts_total(method: &'static str, outcome: &'static str) {
    metrics::counter!("login_attempts_total",
        "method" => method,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a session issued, labelled by how it was obtained.
pub fn sessions_issued_total(source: &'static str) {
    metrics::counter!("sessions_issued_total", "source" => source).increment(1);
}

/// Increment rejected refresh attempts.
pub fn refresh_rejections_total() {
    metrics::counter!("refresh_rejections_total").increment(1);
}

/// Increment magic links sent.
pub fn magic_links_issued_total() {
    metrics::counter!("magic_links_issued_total").increment(1);
}

/// Add expired magic links removed by the sweeper.
pub fn magic_links_purged_total(count: u64) {
    metrics::counter!("magic_links_purged_total").increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        http_requests_total("GET", "/health", 200);
        http_request_duration_ms("GET", "/health", 1.5);
        login_attempts_total("password", "failure");
        sessions_issued_total("refresh");
        refresh_rejections_total();
        magic_links_issued_total();
        magic_links_purged_total(3);
    }
}
