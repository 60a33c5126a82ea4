//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_http_requests_total` (counter): requests by method, status, route
//! - `gateway_http_request_duration_seconds` (histogram): latency by route
//! - `gateway_sessions_active` (gauge): open relay sessions
//! - `gateway_sessions_total` (counter): opened sessions by outcome
//! - `gateway_session_duration_seconds` (histogram): opened sessions
//! - `gateway_relay_messages_total` / `gateway_relay_bytes_total` (counter): by direction
//! - `gateway_upstream_failures_total` (counter): dial failures by kind
//! - `gateway_tls_handshake_failures_total` (counter): by kind
//! - `gateway_rejected_upgrades_total` (counter)
//! - `gateway_alerts_dropped_total` (counter): alerts lost to a full queue
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels are low-cardinality: route labels, never raw paths

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const HTTP_REQUESTS_TOTAL: &str = "gateway_http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "gateway_http_request_duration_seconds";
pub const SESSIONS_ACTIVE: &str = "gateway_sessions_active";
pub const SESSIONS_TOTAL: &str = "gateway_sessions_total";
pub const SESSION_DURATION_SECONDS: &str = "gateway_session_duration_seconds";
pub const RELAY_MESSAGES_TOTAL: &str = "gateway_relay_messages_total";
pub const RELAY_BYTES_TOTAL: &str = "gateway_relay_bytes_total";
pub const UPSTREAM_FAILURES_TOTAL: &str = "gateway_upstream_failures_total";
pub const TLS_HANDSHAKE_FAILURES_TOTAL: &str = "gateway_tls_handshake_failures_total";
pub const REJECTED_UPGRADES_TOTAL: &str = "gateway_rejected_upgrades_total";
pub const ALERTS_DROPPED_TOTAL: &str = "gateway_alerts_dropped_total";

/// Install the global Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, status: u16, route: &'static str, start: Instant) {
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route
    )
    .increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn session_opened() {
    metrics::gauge!(SESSIONS_ACTIVE).increment(1.0);
}

pub fn session_closed() {
    metrics::gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record how an opened session ended.
pub fn record_session_outcome(outcome: &'static str, duration: Duration) {
    metrics::counter!(SESSIONS_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(SESSION_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub fn record_relay_message(direction: &'static str, bytes: usize) {
    metrics::counter!(RELAY_MESSAGES_TOTAL, "direction" => direction).increment(1);
    metrics::counter!(RELAY_BYTES_TOTAL, "direction" => direction).increment(bytes as u64);
}

pub fn record_upstream_failure(kind: &'static str) {
    metrics::counter!(UPSTREAM_FAILURES_TOTAL, "kind" => kind).increment(1);
}

pub fn record_tls_handshake_failure(kind: &'static str) {
    metrics::counter!(TLS_HANDSHAKE_FAILURES_TOTAL, "kind" => kind).increment(1);
}

pub fn record_rejected_upgrade() {
    metrics::counter!(REJECTED_UPGRADES_TOTAL).increment(1);
}

pub fn record_alert_dropped() {
    metrics::counter!(ALERTS_DROPPED_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn recording_shows_up_in_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_request("POST", 200, "token_generate", Instant::now());
            record_relay_message("client_to_upstream", 4);
            record_upstream_failure("timeout");
        });

        let output = handle.render();
        assert!(output.contains(HTTP_REQUESTS_TOTAL));
        assert!(output.contains("route=\"token_generate\""));
        assert!(output.contains(RELAY_BYTES_TOTAL));
        assert!(output.contains("kind=\"timeout\""));
    }

    #[test]
    fn metric_names_are_snake_case() {
        for name in [
            HTTP_REQUESTS_TOTAL,
            HTTP_REQUEST_DURATION_SECONDS,
            SESSIONS_ACTIVE,
            SESSIONS_TOTAL,
            SESSION_DURATION_SECONDS,
            RELAY_MESSAGES_TOTAL,
            RELAY_BYTES_TOTAL,
            UPSTREAM_FAILURES_TOTAL,
            TLS_HANDSHAKE_FAILURES_TOTAL,
            REJECTED_UPGRADES_TOTAL,
            ALERTS_DROPPED_TOTAL,
        ] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
