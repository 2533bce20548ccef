//! Metrics collection and exposition.
//!
//! # Metrics
//! - `security_rejections_total` (counter): terminal results by check, kind
//! - `security_degraded_total` (counter): fail-open/closed decisions by component
//! - `rate_limit_checks_total` (counter): counter touches by action, outcome
//! - `threat_findings_total` (counter): findings by severity
//! - `tokens_issued_total` (counter): credentials minted by kind
//! - `token_verifications_total` (counter): verification results by outcome
//! - `security_pipeline_duration_seconds` (histogram): per-route check latency
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Prometheus exporter is optional and bound to its own address

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rejection(check: &'static str, kind: &'static str) {
    counter!("security_rejections_total", "check" => check, "kind" => kind).increment(1);
}

pub fn record_degraded(component: &'static str) {
    counter!("security_degraded_total", "component" => component).increment(1);
}

pub fn record_rate_limit(action: &str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "limited" };
    counter!(
        "rate_limit_checks_total",
        "action" => action.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_finding(severity: &'static str) {
    counter!("threat_findings_total", "severity" => severity).increment(1);
}

pub fn record_token_issued(kind: &'static str) {
    counter!("tokens_issued_total", "kind" => kind).increment(1);
}

pub fn record_verification(outcome: &'static str) {
    counter!("token_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_pipeline_duration(route: &str, start: Instant) {
    histogram!("security_pipeline_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}
