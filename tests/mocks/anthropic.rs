//! Mock Messages API server, used for both passthrough dialects

use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub struct MockAnthropic {
    server: MockServer,
}

impl MockAnthropic {
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

    pub async fn last_request(&self) -> wiremock::Request {
        self.received_requests()
            .await
            .pop()
            .expect("No upstream request received")
    }

    /// Canonical event stream replying `text`
    pub fn text_events(model: &str, text: &str) -> String {
        let frames = [
            ("message_start", json!({"type": "message_start", "message": {
                "id": "msg_mock", "type": "message", "role": "assistant", "content": [],
                "model": model, "stop_reason": null, "stop_sequence": null,
                "usage": {"input_tokens": 5, "output_tokens": 1}
            }})),
            ("content_block_start", json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
            ("ping", json!({"type": "ping"})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ("message_delta", json!({"type": "message_delta", "delta": {"stop_reason": "end_turn", "stop_sequence": null}, "usage": {"output_tokens": 2}})),
            ("message_stop", json!({"type": "message_stop"})),
        ];

        frames.iter().map(|(event, data)| frame(event, data)).collect()
    }

    pub async fn mock_text_stream(&self, model: &str, text: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(Self::text_events(model, text)),
            )
            .mount(&self.server)
            .await;
    }

    /// Stream `frames` between a `message_start` and the closing events
    pub async fn mock_events(&self, frames: &[(&str, Value)]) {
        let mut body = frame("message_start", &json!({"type": "message_start", "message": {
            "id": "msg_mock", "type": "message", "role": "assistant", "content": [],
            "model": "claude-sonnet-4-5", "stop_reason": null, "stop_sequence": null,
            "usage": {"input_tokens": 5, "output_tokens": 1}
        }}));
        for (event, data) in frames {
            body.push_str(&frame(event, data));
        }
        body.push_str(&frame("message_delta", &json!({"type": "message_delta", "delta": {"stop_reason": "end_turn", "stop_sequence": null}, "usage": {"output_tokens": 2}})));
        body.push_str(&frame("message_stop", &json!({"type": "message_stop"})));

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_error(&self, status: u16, kind: &str, message: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "type": "error",
                "error": {"type": kind, "message": message}
            })))
            .mount(&self.server)
            .await;
    }
}

fn frame(event: &str, data: &Value) -> String {
    format!("event: {}\ndata: {}\n\n", event, data)
}
