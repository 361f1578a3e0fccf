//! Routing integration tests
//!
//! Sticky provider selection and credential gating through the HTTP surface.

use axum::http::{header, HeaderValue, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{message_request, GatewayTestHarness};

#[tokio::test]
async fn test_bare_model_without_sticky_goes_to_default() {
    let harness = GatewayTestHarness::new().await;
    harness.glm.mock_text_stream("glm-4.7", "hi").await;

    harness
        .server
        .post("/v1/messages")
        .json(&message_request("claude-3-5-haiku-20241022", false))
        .await
        .assert_status_ok();

    let request = harness.glm.last_request().await;
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["model"], "glm-4.7");
}

#[tokio::test]
async fn test_bare_model_follows_sticky_provider() {
    let harness = GatewayTestHarness::new().await;
    harness.openrouter.mock_text_stream(&["ok"]).await;

    harness
        .server
        .post("/v1/messages")
        .json(&message_request("openrouter/openai/gpt-4o", false))
        .await
        .assert_status_ok();
    harness
        .server
        .post("/v1/messages")
        .json(&message_request("meta-llama/llama-3.1-70b", false))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    harness
        .server
        .post("/v1/messages")
        .json(&message_request("qwen-2.5-72b", false))
        .await
        .assert_status_ok();

    let requests = harness.openrouter.received_requests().await;
    assert_eq!(requests.len(), 2);
    let body: Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(body["model"], "qwen-2.5-72b");

    let status: Value = harness.server.get("/_status").await.json();
    assert_eq!(status, json!({"provider": "openrouter", "model": "qwen-2.5-72b"}));
}

#[tokio::test]
async fn test_prefix_overrides_sticky_provider() {
    let harness = GatewayTestHarness::new().await;
    harness.openai.mock_text_stream(&["a"]).await;
    harness.gemini.mock_text_stream(&["b"]).await;

    for model in ["openai/gpt-4o", "gemini:gemini-2.5-pro"] {
        harness
            .server
            .post("/v1/messages")
            .json(&message_request(model, false))
            .await
            .assert_status_ok();
    }

    assert_eq!(harness.openai.received_requests().await.len(), 1);
    assert_eq!(harness.gemini.received_requests().await.len(), 1);

    let status: Value = harness.server.get("/_status").await.json();
    assert_eq!(status, json!({"provider": "gemini", "model": "gemini-2.5-pro"}));
}

#[tokio::test]
async fn test_missing_adapted_credential_is_unauthorized() {
    let harness = GatewayTestHarness::without(&["OPENAI_API_KEY"]).await;
    harness.openai.mock_text_stream(&["never"]).await;
    harness.gemini.mock_text_stream(&["fine"]).await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("openai/gpt-4o", true))
        .await;

    // Rejected before any stream starts
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        HeaderValue::from_static("application/json")
    );
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "authentication_error");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("OPENAI_API_KEY"));
    assert!(harness.openai.received_requests().await.is_empty());

    // Other providers keep working
    harness
        .server
        .post("/v1/messages")
        .json(&message_request("gemini:gemini-2.5-flash", true))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_missing_passthrough_credential_is_server_error() {
    let harness = GatewayTestHarness::without(&["ANTHROPIC_UPSTREAM_URL"]).await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("anthropic:claude-sonnet-4-5", false))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "api_error");
}

#[tokio::test]
async fn test_capability_advisory_does_not_block() {
    let harness = GatewayTestHarness::new().await;
    harness.openrouter.mock_text_stream(&["sure"]).await;

    let request = json!({
        "model": "openrouter/auto",
        "max_tokens": 64,
        "tools": [{"name": "lookup", "input_schema": {"type": "object"}}],
        "messages": [{"role": "user", "content": "Look it up"}]
    });
    harness
        .server
        .post("/v1/messages")
        .json(&request)
        .await
        .assert_status_ok();

    assert_eq!(harness.openrouter.received_requests().await.len(), 1);
}
