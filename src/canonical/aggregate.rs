//! Non-streaming responses
//!
//! Every upstream is consumed as a stream. When the caller did not ask for
//! one, the events are folded into a single `message` object here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::events::{BlockDelta, BlockStart, ErrorDetail, StreamEvent, Usage};

/// A complete Messages API response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<Value>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("{}", .0.message)]
    Upstream(ErrorDetail),

    #[error("Stream ended before message_stop")]
    Incomplete,

    #[error("Content block {0} was never started")]
    UnknownBlock(usize),

    #[error("Tool input for block {index} is not valid JSON: {source}")]
    InvalidToolInput {
        index: usize,
        source: serde_json::Error,
    },
}

#[derive(Debug)]
enum PartialBlock {
    Text {
        text: String,
        citations: Vec<Value>,
    },
    ToolUse {
        kind: &'static str,
        id: String,
        name: String,
        input: Value,
        json: String,
    },
    Thinking {
        thinking: String,
        signature: Option<String>,
    },
    /// A block kept as raw JSON; deltas are applied by field name
    Raw {
        block: Value,
        json: String,
    },
}

impl PartialBlock {
    fn from_start(start: BlockStart) -> Self {
        match start {
            BlockStart::Text { text } => PartialBlock::Text {
                text,
                citations: Vec::new(),
            },
            BlockStart::ToolUse { id, name, input } => PartialBlock::ToolUse {
                kind: "tool_use",
                id,
                name,
                input,
                json: String::new(),
            },
            BlockStart::ServerToolUse { id, name, input } => PartialBlock::ToolUse {
                kind: "server_tool_use",
                id,
                name,
                input,
                json: String::new(),
            },
            BlockStart::Thinking {
                thinking,
                signature,
            } => PartialBlock::Thinking {
                thinking,
                signature,
            },
            BlockStart::Other(block) => PartialBlock::Raw {
                block,
                json: String::new(),
            },
            other => PartialBlock::Raw {
                block: serde_json::to_value(other).unwrap_or(Value::Null),
                json: String::new(),
            },
        }
    }

    fn apply(&mut self, delta: BlockDelta) {
        match (self, delta) {
            (PartialBlock::Text { text, .. }, BlockDelta::TextDelta { text: more }) => {
                text.push_str(&more)
            }
            (PartialBlock::Text { citations, .. }, BlockDelta::CitationsDelta { citation }) => {
                citations.push(citation)
            }
            (PartialBlock::ToolUse { json, .. }, BlockDelta::InputJsonDelta { partial_json }) => {
                json.push_str(&partial_json)
            }
            (PartialBlock::Thinking { thinking, .. }, BlockDelta::ThinkingDelta { thinking: more }) => {
                thinking.push_str(&more)
            }
            (PartialBlock::Thinking { signature, .. }, BlockDelta::SignatureDelta { signature: sig }) => {
                signature.get_or_insert_with(String::new).push_str(&sig)
            }
            (PartialBlock::Raw { block, json }, delta) => apply_raw(block, json, delta),
            // Mismatched delta kinds carry nothing we can place
            _ => {}
        }
    }

    fn into_value(self, index: usize) -> Result<Value, AggregateError> {
        Ok(match self {
            PartialBlock::Text { text, citations } => {
                if citations.is_empty() {
                    json!({"type": "text", "text": text})
                } else {
                    json!({"type": "text", "text": text, "citations": citations})
                }
            }
            PartialBlock::ToolUse {
                kind,
                id,
                name,
                input,
                json,
            } => {
                let input = if json.trim().is_empty() {
                    input
                } else {
                    serde_json::from_str(&json)
                        .map_err(|source| AggregateError::InvalidToolInput { index, source })?
                };
                json!({"type": kind, "id": id, "name": name, "input": input})
            }
            PartialBlock::Thinking {
                thinking,
                signature,
            } => json!({
                "type": "thinking",
                "thinking": thinking,
                "signature": signature.unwrap_or_default(),
            }),
            PartialBlock::Raw { mut block, json } => {
                if !json.trim().is_empty() {
                    let input = serde_json::from_str(&json)
                        .map_err(|source| AggregateError::InvalidToolInput { index, source })?;
                    if let Some(object) = block.as_object_mut() {
                        object.insert("input".to_string(), input);
                    }
                }
                block
            }
        })
    }
}

fn apply_raw(block: &mut Value, json: &mut String, delta: BlockDelta) {
    let Some(object) = block.as_object_mut() else {
        return;
    };

    let (key, more) = match delta {
        BlockDelta::TextDelta { text } => ("text", text),
        BlockDelta::ThinkingDelta { thinking } => ("thinking", thinking),
        BlockDelta::SignatureDelta { signature } => ("signature", signature),
        BlockDelta::InputJsonDelta { partial_json } => {
            json.push_str(&partial_json);
            return;
        }
        BlockDelta::CitationsDelta { citation } => {
            match object.get_mut("citations") {
                Some(Value::Array(citations)) => citations.push(citation),
                _ => {
                    object.insert("citations".to_string(), Value::Array(vec![citation]));
                }
            }
            return;
        }
        BlockDelta::Other(_) => return,
    };

    match object.get_mut(key) {
        Some(Value::String(existing)) => existing.push_str(&more),
        _ => {
            object.insert(key.to_string(), Value::String(more));
        }
    }
}

/// Accumulates one event sequence into a [`MessageResponse`]
#[derive(Debug, Default)]
pub struct MessageAggregator {
    id: String,
    model: String,
    started: bool,
    blocks: BTreeMap<usize, PartialBlock>,
    stop_reason: Option<String>,
    stop_sequence: Option<String>,
    usage: Usage,
    complete: bool,
}

impl MessageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. An `error` event ends aggregation with its detail.
    pub fn push(&mut self, event: StreamEvent) -> Result<(), AggregateError> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.model = message.model;
                self.usage = message.usage;
                self.started = true;
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.blocks
                    .insert(index, PartialBlock::from_start(content_block));
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                self.blocks
                    .get_mut(&index)
                    .ok_or(AggregateError::UnknownBlock(index))?
                    .apply(delta);
            }
            StreamEvent::ContentBlockStop { .. } | StreamEvent::Ping => {}
            StreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                if delta.stop_sequence.is_some() {
                    self.stop_sequence = delta.stop_sequence;
                }
                self.usage.output_tokens = usage.output_tokens;
                if let Some(input_tokens) = usage.input_tokens {
                    self.usage.input_tokens = input_tokens;
                }
            }
            StreamEvent::MessageStop => self.complete = true,
            StreamEvent::Error { error } => return Err(AggregateError::Upstream(error)),
        }
        Ok(())
    }

    /// Produce the final message; fails if the stream never completed
    pub fn finish(self) -> Result<MessageResponse, AggregateError> {
        if !self.started || !self.complete {
            return Err(AggregateError::Incomplete);
        }

        let mut content = Vec::with_capacity(self.blocks.len());
        for (index, block) in self.blocks {
            content.push(block.into_value(index)?);
        }

        Ok(MessageResponse {
            id: self.id,
            kind: "message".to_string(),
            role: "assistant".to_string(),
            content,
            model: self.model,
            stop_reason: self.stop_reason,
            stop_sequence: self.stop_sequence,
            usage: self.usage,
        })
    }
}
