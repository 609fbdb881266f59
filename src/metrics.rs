//! Prometheus metrics for application observability.
//!
//! Metrics are exposed by a dedicated listener when `METRICS_PORT` is set.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `whatsapp_messages_sent_total` - Messages handed to the provider (labels: template, status)
//! - `whatsapp_rate_limited_total` - Requests rejected by the rate limiter
//! - `whatsapp_auth_failures_total` - Failed authentications (label: reason)
//! - `whatsapp_rate_limit_evictions_total` - Idle clients dropped by the sweep
//!
//! ## Histograms
//! - `whatsapp_provider_request_duration_seconds` - Provider call latency (label: outcome)
//!
//! ## Gauges
//! - `whatsapp_rate_limit_tracked_clients` - Client identities held by the limiter
//!
//! # Usage
//!
//! ```rust,ignore
//! use whatsapp_relay::metrics::{init_metrics, record_message_sent};
//!
//! init_metrics(addr)?;
//! record_message_sent("hello_world", "sent");
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const MESSAGES_SENT_TOTAL: &str = "whatsapp_messages_sent_total";
    pub const RATE_LIMITED_TOTAL: &str = "whatsapp_rate_limited_total";
    pub const AUTH_FAILURES_TOTAL: &str = "whatsapp_auth_failures_total";
    pub const RATE_LIMIT_EVICTIONS_TOTAL: &str = "whatsapp_rate_limit_evictions_total";
    pub const PROVIDER_REQUEST_DURATION_SECONDS: &str =
        "whatsapp_provider_request_duration_seconds";
    pub const RATE_LIMIT_TRACKED_CLIENTS: &str = "whatsapp_rate_limit_tracked_clients";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (port in use, or a
/// recorder is already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::MESSAGES_SENT_TOTAL,
        "Total number of messages handed to the WhatsApp API"
    );
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );
    describe_counter!(
        names::AUTH_FAILURES_TOTAL,
        "Total number of failed API key authentications"
    );
    describe_counter!(
        names::RATE_LIMIT_EVICTIONS_TOTAL,
        "Total number of idle client identities evicted from the rate limiter"
    );

    describe_histogram!(
        names::PROVIDER_REQUEST_DURATION_SECONDS,
        "WhatsApp API request duration in seconds"
    );

    describe_gauge!(
        names::RATE_LIMIT_TRACKED_CLIENTS,
        "Client identities currently tracked by the rate limiter"
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

// =============================================================================
// Counters
// =============================================================================

/// Record a delivery attempt outcome.
pub fn record_message_sent(template: &str, status: &str) {
    counter!(names::MESSAGES_SENT_TOTAL, "template" => template.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record a rate limiter rejection.
pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

/// Record a failed authentication.
pub fn record_auth_failure(missing: bool) {
    let reason = if missing { "missing" } else { "invalid" };
    counter!(names::AUTH_FAILURES_TOTAL, "reason" => reason).increment(1);
}

/// Record idle identities dropped by one sweep.
pub fn record_rate_limit_evictions(count: u64) {
    counter!(names::RATE_LIMIT_EVICTIONS_TOTAL).increment(count);
}

// =============================================================================
// Histograms and Gauges
// =============================================================================

/// Record one provider call.
pub fn record_provider_duration(outcome: &'static str, duration_secs: f64) {
    histogram!(names::PROVIDER_REQUEST_DURATION_SECONDS, "outcome" => outcome)
        .record(duration_secs);
}

/// Update the tracked-clients gauge.
pub fn set_tracked_clients(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!(names::RATE_LIMIT_TRACKED_CLIENTS).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder is a no-op and must not panic.

    #[test]
    fn test_record_counters() {
        record_message_sent("hello_world", "sent");
        record_rate_limited();
        record_auth_failure(true);
        record_auth_failure(false);
        record_rate_limit_evictions(3);
    }

    #[test]
    fn test_record_provider_duration() {
        record_provider_duration("success", 0.1);
    }

    #[test]
    fn test_set_tracked_clients() {
        set_tracked_clients(0);
        set_tracked_clients(42);
    }
}
