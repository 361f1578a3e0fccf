//! Messages endpoint integration tests
//!
//! Tests for `POST /v1/messages` against each provider wire format, streaming
//! and non-streaming, plus upstream failure handling.

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{constants, event_names, message_request, parse_sse, GatewayTestHarness};

fn text_of(events: &[(String, Value)]) -> String {
    events
        .iter()
        .filter(|(_, data)| data["delta"]["type"] == "text_delta")
        .filter_map(|(_, data)| data["delta"]["text"].as_str())
        .collect()
}

// ===========================================
// OpenAI-compatible upstreams
// ===========================================

#[tokio::test]
async fn test_openai_stream_is_relayed_as_canonical_events() {
    let harness = GatewayTestHarness::new().await;
    harness.openai.mock_text_stream(&["Hel", "lo"]).await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("openai/gpt-4o", true))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        HeaderValue::from_static("text/event-stream")
    );

    let body = response.text();
    let names = event_names(&body);
    assert_eq!(names.first().map(String::as_str), Some("message_start"));
    assert_eq!(names.last().map(String::as_str), Some("message_stop"));
    assert_eq!(names.iter().filter(|n| *n == "message_stop").count(), 1);

    let events = parse_sse(&body);
    assert_eq!(text_of(&events), "Hello");
    assert_eq!(events[0].1["message"]["model"], "gpt-4o");

    let (_, delta) = events
        .iter()
        .find(|(name, _)| name == "message_delta")
        .expect("message_delta missing");
    assert_eq!(delta["delta"]["stop_reason"], "end_turn");
    assert_eq!(delta["usage"]["output_tokens"], 4);
}

#[tokio::test]
async fn test_openai_request_is_translated() {
    let harness = GatewayTestHarness::new().await;
    harness.openai.mock_text_stream(&["ok"]).await;

    let request = json!({
        "model": "openai:gpt-4o-mini",
        "max_tokens": 256,
        "system": "Be brief.",
        "messages": [{"role": "user", "content": "Hello!"}]
    });
    harness
        .server
        .post("/v1/messages")
        .json(&request)
        .await
        .assert_status_ok();

    let upstream = harness.openai.last_body().await;
    assert_eq!(upstream["model"], "gpt-4o-mini");
    assert_eq!(upstream["stream"], true);
    assert_eq!(upstream["stream_options"]["include_usage"], true);
    assert_eq!(upstream["max_completion_tokens"], 256);
    assert_eq!(upstream["messages"][0], json!({"role": "system", "content": "Be brief."}));
    assert_eq!(upstream["messages"][1]["role"], "user");

    let requests = harness.openai.received_requests().await;
    assert_eq!(
        requests[0].headers.get("authorization").unwrap(),
        &format!("Bearer {}", constants::TEST_OPENAI_API_KEY)
    );
}

#[tokio::test]
async fn test_non_streaming_response_is_aggregated() {
    let harness = GatewayTestHarness::new().await;
    harness.openai.mock_text_stream(&["Hello", " world"]).await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("openai/gpt-4o", false))
        .await;

    response.assert_status_ok();
    let message: Value = response.json();
    assert_eq!(message["type"], "message");
    assert_eq!(message["role"], "assistant");
    assert_eq!(message["model"], "gpt-4o");
    assert_eq!(message["content"], json!([{"type": "text", "text": "Hello world"}]));
    assert_eq!(message["stop_reason"], "end_turn");
    assert_eq!(message["usage"]["input_tokens"], 12);
    assert_eq!(message["usage"]["output_tokens"], 4);
}

#[tokio::test]
async fn test_tool_call_fragments_become_one_tool_use() {
    let harness = GatewayTestHarness::new().await;
    harness
        .openai
        .mock_tool_call_stream("get_weather", ["{\"city\":", "\"Paris\"}"])
        .await;

    let request = json!({
        "model": "openai/gpt-4o",
        "max_tokens": 256,
        "tools": [{
            "name": "get_weather",
            "description": "Current weather",
            "input_schema": {"type": "object", "properties": {"city": {"type": "string"}}}
        }],
        "messages": [{"role": "user", "content": "Weather in Paris?"}]
    });
    let response = harness.server.post("/v1/messages").json(&request).await;

    response.assert_status_ok();
    let message: Value = response.json();
    assert_eq!(message["stop_reason"], "tool_use");
    assert_eq!(message["content"][0]["type"], "tool_use");
    assert_eq!(message["content"][0]["id"], "call_1");
    assert_eq!(message["content"][0]["name"], "get_weather");
    assert_eq!(message["content"][0]["input"], json!({"city": "Paris"}));

    let upstream = harness.openai.last_body().await;
    assert_eq!(upstream["tools"][0]["type"], "function");
    assert_eq!(upstream["tools"][0]["function"]["name"], "get_weather");
}

#[tokio::test]
async fn test_openrouter_sends_attribution_headers() {
    let harness = GatewayTestHarness::new().await;
    harness.openrouter.mock_text_stream(&["ok"]).await;

    harness
        .server
        .post("/v1/messages")
        .json(&message_request("openrouter/anthropic/claude-3.5-sonnet", false))
        .await
        .assert_status_ok();

    let requests = harness.openrouter.received_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].headers.get("http-referer").unwrap(), "http://localhost/test");
    assert_eq!(requests[0].headers.get("x-title").unwrap(), "claude-proxy tests");

    let upstream = harness.openrouter.last_body().await;
    assert_eq!(upstream["model"], "anthropic/claude-3.5-sonnet");
    assert_eq!(upstream["max_tokens"], 256);
    assert!(upstream.get("max_completion_tokens").is_none());
}

// ===========================================
// Gemini
// ===========================================

#[tokio::test]
async fn test_gemini_stream_is_translated() {
    let harness = GatewayTestHarness::new().await;
    harness.gemini.mock_text_stream(&["Hi", " there"]).await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("gemini:gemini-2.5-flash", false))
        .await;

    response.assert_status_ok();
    let message: Value = response.json();
    assert_eq!(message["content"], json!([{"type": "text", "text": "Hi there"}]));
    assert_eq!(message["stop_reason"], "end_turn");
    assert_eq!(message["usage"]["output_tokens"], 3);

    let upstream = harness.gemini.last_body().await;
    assert_eq!(upstream["contents"][0]["role"], "user");
    assert_eq!(upstream["contents"][0]["parts"][0]["text"], "Hello!");
    assert_eq!(upstream["generationConfig"]["maxOutputTokens"], 256);
}

// ===========================================
// Native passthrough
// ===========================================

#[tokio::test]
async fn test_anthropic_passthrough_forwards_events_and_headers() {
    let harness = GatewayTestHarness::new().await;
    harness
        .anthropic
        .mock_text_stream("claude-sonnet-4-5", "Hello from upstream")
        .await;

    let response = harness
        .server
        .post("/v1/messages")
        .add_header(
            HeaderName::from_static("anthropic-beta"),
            HeaderValue::from_static("interleaved-thinking-2025-05-14"),
        )
        .json(&message_request("anthropic:", true))
        .await;

    response.assert_status_ok();
    assert_eq!(
        event_names(&response.text()),
        vec![
            "message_start",
            "content_block_start",
            "ping",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );

    let request = harness.anthropic.last_request().await;
    assert_eq!(
        request.headers.get("x-api-key").unwrap(),
        constants::TEST_ANTHROPIC_API_KEY
    );
    assert_eq!(request.headers.get("anthropic-version").unwrap(), "2023-06-01");
    assert_eq!(
        request.headers.get("anthropic-beta").unwrap(),
        "interleaved-thinking-2025-05-14"
    );

    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["model"], "claude-sonnet-4-5");
    assert_eq!(body["stream"], true);
}

#[tokio::test]
async fn test_glm_passthrough_uses_bearer_auth() {
    let harness = GatewayTestHarness::new().await;
    harness.glm.mock_text_stream("glm-4.7", "你好").await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("glm/glm-4.7", false))
        .await;

    response.assert_status_ok();
    let message: Value = response.json();
    assert_eq!(message["id"], "msg_mock");
    assert_eq!(message["content"][0]["text"], "你好");

    let request = harness.glm.last_request().await;
    assert_eq!(
        request.headers.get("authorization").unwrap(),
        &format!("Bearer {}", constants::TEST_ZAI_API_KEY)
    );
    assert!(request.headers.get("x-api-key").is_none());
}

// ===========================================
// Errors
// ===========================================

#[tokio::test]
async fn test_upstream_status_is_returned_for_non_streaming() {
    let harness = GatewayTestHarness::new().await;
    harness.openai.mock_error(429, "Rate limit reached").await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("openai/gpt-4o", false))
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "rate_limit_error");
    assert_eq!(body["error"]["message"], "Rate limit reached");
}

#[tokio::test]
async fn test_upstream_status_is_returned_before_streaming() {
    let harness = GatewayTestHarness::new().await;
    harness
        .anthropic
        .mock_error(529, "overloaded_error", "Overloaded")
        .await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("anthropic/claude-sonnet-4-5", true))
        .await;

    response.assert_status(StatusCode::from_u16(529).unwrap());
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        HeaderValue::from_static("application/json")
    );
    let body: Value = response.json();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "overloaded_error");
    assert_eq!(body["error"]["message"], "Overloaded");
}

#[tokio::test]
async fn test_passthrough_auth_failure_keeps_status_when_streaming() {
    let harness = GatewayTestHarness::new().await;
    harness
        .glm
        .mock_error(401, "authentication_error", "invalid x-api-key")
        .await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("glm/glm-4.7", true))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn test_unmodeled_passthrough_blocks_reach_the_caller() {
    let harness = GatewayTestHarness::new().await;
    let start = json!({
        "type": "content_block_start", "index": 0,
        "content_block": {"type": "text", "text": "", "citations": []}
    });
    let tool = json!({
        "type": "content_block_start", "index": 1,
        "content_block": {"type": "mcp_tool_use", "id": "mcptoolu_1", "name": "search", "server_name": "docs", "input": {}}
    });
    harness
        .anthropic
        .mock_events(&[
            ("content_block_start", start.clone()),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ("content_block_start", tool.clone()),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 1})),
        ])
        .await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("anthropic/claude-sonnet-4-5", true))
        .await;

    response.assert_status_ok();
    let events = parse_sse(&response.text());
    let starts: Vec<&Value> = events
        .iter()
        .filter(|(name, _)| name == "content_block_start")
        .map(|(_, data)| data)
        .collect();
    assert_eq!(starts, vec![&start, &tool]);
    assert_eq!(events.last().unwrap().0, "message_stop");
}

#[tokio::test]
async fn test_malformed_body_is_invalid_request() {
    let harness = GatewayTestHarness::new().await;

    let response = harness.server.post("/v1/messages").text("{not json").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_unknown_provider_is_rejected() {
    let harness = GatewayTestHarness::new().await;

    let response = harness
        .server
        .post("/v1/messages")
        .json(&message_request("mistral/large", true))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("mistral"));
}
