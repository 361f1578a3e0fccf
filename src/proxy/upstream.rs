//! Upstream HTTP client
//!
//! Sends the single request a translator produced and hands back the response
//! body as a byte stream. Non-2xx responses are read in full and turned into
//! an error instead.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use serde_json::Value;
use thiserror::Error;

use crate::canonical::{error_kind_for_status, ErrorDetail};

/// Stream of upstream body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Longest upstream error body echoed back to the caller
const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// A provider-native request, ready to send
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("No data from upstream for {} seconds", .0.as_secs())]
    IdleTimeout(Duration),
}

impl UpstreamError {
    /// Canonical error payload for this failure
    pub fn to_error_detail(&self) -> ErrorDetail {
        match self {
            UpstreamError::Status { status, message } => {
                ErrorDetail::new(error_kind_for_status(*status), message.clone())
                    .with_status(*status)
            }
            UpstreamError::Transport(_) | UpstreamError::IdleTimeout(_) => {
                ErrorDetail::new("api_error", self.to_string())
            }
        }
    }
}

/// Thin wrapper over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// POST the request and return the body stream on success
    pub async fn open(&self, request: &UpstreamRequest) -> Result<ByteStream, UpstreamError> {
        let response = self
            .client
            .post(&request.url)
            .headers(request.headers.clone())
            .json(&request.body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(UpstreamError::from)),
        ))
    }
}

/// Pull a human-readable message out of a provider error body.
///
/// Understands `{"error": {"message"}}` (OpenAI, Anthropic, Gemini),
/// `{"error": "..."}`, Gemini's array-wrapped form and `{"message"}`; anything
/// else is returned as truncated text.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let root = match &value {
            Value::Array(items) => items.first().unwrap_or(&Value::Null),
            other => other,
        };
        let candidates = [
            root.pointer("/error/message"),
            root.get("error"),
            root.get("message"),
        ];
        if let Some(message) = candidates
            .into_iter()
            .flatten()
            .find_map(Value::as_str)
        {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "Upstream returned an empty error body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}
