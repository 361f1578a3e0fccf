//! Health endpoint integration tests
//!
//! - GET /healthz - liveness with the active routing target
//! - GET /_status - sticky routing target
//! - GET /metrics - Prometheus text

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{message_request, GatewayTestHarness};

#[tokio::test]
async fn test_healthz_before_any_request() {
    let harness = GatewayTestHarness::new().await;

    let response = harness.server.get("/healthz").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["active"], json!({"provider": "glm", "model": "auto"}));
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_status_defaults_to_glm() {
    let harness = GatewayTestHarness::new().await;

    let body: Value = harness.server.get("/_status").await.json();
    assert_eq!(body, json!({"provider": "glm", "model": "glm-4.7"}));
}

#[tokio::test]
async fn test_healthz_reports_sticky_target() {
    let harness = GatewayTestHarness::new().await;
    harness.gemini.mock_text_stream(&["hi"]).await;

    harness
        .server
        .post("/v1/messages")
        .json(&message_request("gemini:", false))
        .await
        .assert_status_ok();

    let body: Value = harness.server.get("/healthz").await.json();
    assert_eq!(
        body["active"],
        json!({"provider": "gemini", "model": "gemini-2.5-flash"})
    );
}

#[tokio::test]
async fn test_sticky_state_cleared() {
    let harness = GatewayTestHarness::new().await;
    harness.gemini.mock_text_stream(&["hi"]).await;

    harness
        .server
        .post("/v1/messages")
        .json(&message_request("gemini:", false))
        .await
        .assert_status_ok();
    harness.state.gateway.session().clear();

    let body: Value = harness.server.get("/_status").await.json();
    assert_eq!(body, json!({"provider": "glm", "model": "glm-4.7"}));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    claude_proxy::routes::metrics::init_metrics();
    let harness = GatewayTestHarness::new().await;

    let response = harness.server.get("/metrics").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_health_method_not_allowed() {
    let harness = GatewayTestHarness::new().await;

    let response = harness.server.post("/healthz").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
}
