//! Native passthrough translator
//!
//! For backends that already speak the Messages API (Anthropic and Z.AI's
//! GLM endpoint). The request body is forwarded as received apart from the
//! resolved model and the stream flag, and upstream events are relayed as-is.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::canonical::{BlockDelta, BlockStart, CanonicalRequest, StreamEvent};
use crate::proxy::headers::{build_upstream_headers, Auth, ANTHROPIC_BETA, ANTHROPIC_VERSION};
use crate::proxy::UpstreamRequest;

use super::{join_url, DecodeContext, TranslationError, Translator};

/// How the native upstream authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughDialect {
    /// `x-api-key` header
    Anthropic,
    /// `Authorization: Bearer`
    Glm,
}

#[derive(Debug, Clone)]
pub struct PassthroughTranslator {
    dialect: PassthroughDialect,
    base_url: String,
    api_key: String,
    version: String,
    beta: Option<String>,
}

impl PassthroughTranslator {
    pub fn new(
        dialect: PassthroughDialect,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            dialect,
            base_url: base_url.into(),
            api_key: api_key.into(),
            version: version.into(),
            beta: None,
        }
    }

    /// Forward the caller's `anthropic-beta` header
    pub fn with_beta(mut self, beta: Option<String>) -> Self {
        self.beta = beta;
        self
    }
}

impl Translator for PassthroughTranslator {
    fn encode_request(
        &self,
        request: &CanonicalRequest,
        model: &str,
    ) -> Result<UpstreamRequest, TranslationError> {
        let mut body = request.raw().clone();
        let object = body.as_object_mut().ok_or_else(|| {
            TranslationError::InvalidRequest("Request body must be a JSON object".to_string())
        })?;
        object.insert("model".to_string(), Value::String(model.to_string()));
        object.insert("stream".to_string(), Value::Bool(true));

        let auth = match self.dialect {
            PassthroughDialect::Anthropic => Auth::ApiKey {
                header: "x-api-key",
                key: &self.api_key,
            },
            PassthroughDialect::Glm => Auth::Bearer(&self.api_key),
        };
        let mut headers = build_upstream_headers(auth)?;
        headers.insert(
            ANTHROPIC_VERSION,
            self.version
                .parse()
                .map_err(|_| TranslationError::InvalidHeader("anthropic-version"))?,
        );
        if let Some(beta) = &self.beta {
            headers.insert(
                ANTHROPIC_BETA,
                beta.parse()
                    .map_err(|_| TranslationError::InvalidHeader("anthropic-beta"))?,
            );
        }

        Ok(UpstreamRequest {
            url: join_url(&self.base_url, "v1/messages"),
            headers,
            body,
        })
    }

    fn decode_chunk(
        &self,
        chunk: &[u8],
        ctx: &mut DecodeContext,
    ) -> Result<Vec<StreamEvent>, TranslationError> {
        let mut out = Vec::new();
        if ctx.is_terminated() {
            return Ok(out);
        }

        for frame in ctx.sse_frames(chunk)? {
            let raw: Value = serde_json::from_str(&frame.data)
                .map_err(|e| TranslationError::MalformedChunk(e.to_string()))?;
            let event = StreamEvent::from_value(raw.clone(), frame.event.as_deref())
                .map_err(|e| TranslationError::MalformedChunk(e.to_string()))?;

            let Some(event) = event else {
                debug!(event = ?frame.event, "Skipping unknown upstream event");
                continue;
            };

            ctx.observe(&event);
            let event = keep_upstream_blocks(event, &raw);
            let terminal = event.is_terminal();
            out.push(event);
            if terminal {
                break;
            }
        }

        Ok(out)
    }
}

/// Swap typed block payloads for the upstream JSON wherever the typed form
/// would not reproduce it exactly.
fn keep_upstream_blocks(event: StreamEvent, raw: &Value) -> StreamEvent {
    match event {
        StreamEvent::ContentBlockStart {
            index,
            content_block,
        } => {
            let original = &raw["content_block"];
            let content_block = if reproduces(&content_block, original) {
                content_block
            } else {
                BlockStart::Other(original.clone())
            };
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            }
        }
        StreamEvent::ContentBlockDelta { index, delta } => {
            let original = &raw["delta"];
            let delta = if reproduces(&delta, original) {
                delta
            } else {
                BlockDelta::Other(original.clone())
            };
            StreamEvent::ContentBlockDelta { index, delta }
        }
        other => other,
    }
}

fn reproduces<T: Serialize>(typed: &T, original: &Value) -> bool {
    serde_json::to_value(typed).is_ok_and(|value| &value == original)
}
