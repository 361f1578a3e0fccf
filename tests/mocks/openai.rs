//! Mock OpenAI-compatible chat completions server

use serde_json::{json, Value};
use wiremock::{
    matchers::{header_exists, method, path},
    Mock, MockServer, ResponseTemplate,
};

use super::sse_body;

pub struct MockOpenAI {
    server: MockServer,
}

impl MockOpenAI {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Last request body sent upstream
    pub async fn last_body(&self) -> Value {
        let requests = self.received_requests().await;
        let request = requests.last().expect("No upstream request received");
        serde_json::from_slice(&request.body).expect("Upstream body is not JSON")
    }

    /// Mount a raw SSE body for `POST /chat/completions`
    pub async fn mock_stream_body(&self, body: String) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header_exists("authorization"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }

    /// Stream `parts` as content deltas, then stop with usage and `[DONE]`
    pub async fn mock_text_stream(&self, parts: &[&str]) {
        let mut payloads: Vec<Value> = parts
            .iter()
            .map(|part| json!({"choices": [{"index": 0, "delta": {"content": part}, "finish_reason": null}]}))
            .collect();
        payloads.push(json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}));
        payloads.push(json!({"choices": [], "usage": {"prompt_tokens": 12, "completion_tokens": 4}}));

        let mut body = sse_body(&payloads);
        body.push_str("data: [DONE]\n\n");
        self.mock_stream_body(body).await;
    }

    /// One tool call split over two argument fragments
    pub async fn mock_tool_call_stream(&self, name: &str, fragments: [&str; 2]) {
        let payloads = [
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "type": "function", "function": {"name": name, "arguments": fragments[0]}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": fragments[1]}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        ];

        let mut body = sse_body(&payloads);
        body.push_str("data: [DONE]\n\n");
        self.mock_stream_body(body).await;
    }

    pub async fn mock_error(&self, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": {"message": message, "type": "invalid_request_error"}
            })))
            .mount(&self.server)
            .await;
    }
}
