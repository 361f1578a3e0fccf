//! Prometheus metrics endpoint
//!
//! Exposes relay and routing metrics in Prometheus format.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    let _ = &*PROMETHEUS_HANDLE;
    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "claude_proxy_requests_total",
        "Relayed requests by provider and outcome"
    );
    metrics::describe_histogram!(
        "claude_proxy_stream_duration_seconds",
        "Time from dispatch to the end of the relayed stream"
    );
    metrics::describe_counter!(
        "claude_proxy_capability_advisories_total",
        "Requests using capabilities the target provider may not support"
    );
    metrics::describe_counter!(
        "claude_proxy_downstream_disconnects_total",
        "Streams cancelled because the caller went away"
    );
    metrics::describe_counter!(
        "claude_proxy_rejected_requests_total",
        "Requests rejected before reaching an upstream"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

/// Record one finished relay
pub fn record_request(provider: &str, outcome: &str) {
    metrics::counter!(
        "claude_proxy_requests_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_stream_duration(provider: &str, duration_secs: f64) {
    metrics::histogram!("claude_proxy_stream_duration_seconds", "provider" => provider.to_string())
        .record(duration_secs);
}

/// Record one capability advisory per unsupported capability
pub fn record_advisory(provider: &str, capability: &str) {
    metrics::counter!(
        "claude_proxy_capability_advisories_total",
        "provider" => provider.to_string(),
        "capability" => capability.to_string()
    )
    .increment(1);
}

pub fn record_disconnect(provider: &str) {
    metrics::counter!("claude_proxy_downstream_disconnects_total", "provider" => provider.to_string())
        .increment(1);
}

/// Record a request that failed before any upstream I/O
pub fn record_rejection(reason: &str) {
    metrics::counter!("claude_proxy_rejected_requests_total", "reason" => reason.to_string())
        .increment(1);
}
