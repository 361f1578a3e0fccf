//! Mock Gemini `streamGenerateContent` server

use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path_regex, query_param},
    Mock, MockServer, ResponseTemplate,
};

use super::sse_body;

pub const TEST_GEMINI_API_KEY: &str = "test-gemini-api-key";

pub struct MockGemini {
    server: MockServer,
}

impl MockGemini {
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

    pub async fn last_body(&self) -> Value {
        let requests = self.received_requests().await;
        let request = requests.last().expect("No upstream request received");
        serde_json::from_slice(&request.body).expect("Upstream body is not JSON")
    }

    /// Stream `parts` as text candidates, finishing with `STOP`
    pub async fn mock_text_stream(&self, parts: &[&str]) {
        let mut payloads: Vec<Value> = parts
            .iter()
            .map(|part| json!({"candidates": [{"content": {"role": "model", "parts": [{"text": part}]}}]}))
            .collect();
        payloads.push(json!({
            "candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3}
        }));

        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/[^/]+:streamGenerateContent$"))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", TEST_GEMINI_API_KEY))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&payloads)),
            )
            .mount(&self.server)
            .await;
    }
}
