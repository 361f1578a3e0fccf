//! Common test utilities for claude-proxy
//!
//! Builds the real router against wiremock servers standing in for every
//! provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum_test::TestServer;
use claude_proxy::{routes, AppState, Config};
use serde_json::{json, Value};

use crate::mocks::{gemini::TEST_GEMINI_API_KEY, MockAnthropic, MockGemini, MockOpenAI};

/// Test credential constants
pub mod constants {
    pub const TEST_OPENAI_API_KEY: &str = "test-openai-api-key";
    pub const TEST_OPENROUTER_API_KEY: &str = "test-openrouter-api-key";
    pub const TEST_ANTHROPIC_API_KEY: &str = "test-anthropic-api-key";
    pub const TEST_ZAI_API_KEY: &str = "test-zai-api-key";
}

/// The gateway wired to one mock server per provider
pub struct GatewayTestHarness {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub openai: MockOpenAI,
    pub openrouter: MockOpenAI,
    pub gemini: MockGemini,
    pub anthropic: MockAnthropic,
    pub glm: MockAnthropic,
}

impl GatewayTestHarness {
    /// Every provider configured
    pub async fn new() -> Self {
        Self::without(&[]).await
    }

    /// Every provider configured except the listed variables
    pub async fn without(unset: &[&str]) -> Self {
        let openai = MockOpenAI::start().await;
        let openrouter = MockOpenAI::start().await;
        let gemini = MockGemini::start().await;
        let anthropic = MockAnthropic::start().await;
        let glm = MockAnthropic::start().await;

        let mut vars: HashMap<&str, String> = HashMap::from([
            ("OPENAI_API_URL", openai.uri()),
            ("OPENAI_API_KEY", constants::TEST_OPENAI_API_KEY.to_string()),
            ("OPENROUTER_API_URL", openrouter.uri()),
            ("OPENROUTER_API_KEY", constants::TEST_OPENROUTER_API_KEY.to_string()),
            ("OPENROUTER_REFERER", "http://localhost/test".to_string()),
            ("OPENROUTER_TITLE", "claude-proxy tests".to_string()),
            ("GEMINI_API_URL", gemini.uri()),
            ("GEMINI_API_KEY", TEST_GEMINI_API_KEY.to_string()),
            ("ANTHROPIC_UPSTREAM_URL", anthropic.uri()),
            ("ANTHROPIC_API_KEY", constants::TEST_ANTHROPIC_API_KEY.to_string()),
            ("GLM_UPSTREAM_URL", glm.uri()),
            ("ZAI_API_KEY", constants::TEST_ZAI_API_KEY.to_string()),
            ("CLAUDE_PROXY_IDLE_TIMEOUT_SECS", "5".to_string()),
        ]);
        for key in unset {
            vars.remove(key);
        }

        let config = Config::from_lookup(|key| vars.get(key).cloned())
            .expect("Failed to build test config");
        let state = Arc::new(AppState::new(config).expect("Failed to build app state"));
        let app = routes::create_router(state.clone());
        let server = TestServer::new(app).expect("Failed to create test server");

        Self {
            server,
            state,
            openai,
            openrouter,
            gemini,
            anthropic,
            glm,
        }
    }
}

/// Minimal Messages API request
pub fn message_request(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "max_tokens": 256,
        "stream": stream,
        "messages": [{"role": "user", "content": "Hello!"}]
    })
}

/// Split an SSE body into `(event, data)` pairs
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let mut event = String::new();
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = name.to_string();
                } else if let Some(payload) = line.strip_prefix("data: ") {
                    data.push_str(payload);
                }
            }
            let data = serde_json::from_str(&data).expect("SSE data is not JSON");
            (event, data)
        })
        .collect()
}

/// Event names of an SSE body, in order
pub fn event_names(body: &str) -> Vec<String> {
    parse_sse(body).into_iter().map(|(event, _)| event).collect()
}
