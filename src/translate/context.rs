//! Per-request decode state
//!
//! Adapted providers send loosely structured deltas; the canonical protocol
//! requires a strict block structure. `DecodeContext` owns that structure for
//! one response: which block is open, the next block index, tool call
//! fragments still being assembled, and whether the message has terminated.
//! Translators only feed it text, reasoning and tool calls.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::canonical::{
    BlockDelta, BlockStart, DeltaUsage, ErrorDetail, MessageDelta, MessageStart, StreamEvent,
};
use crate::streaming::{SseFrame, SseFrameBuffer, SseLineBuffer};

use super::TranslationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    /// Opened by a passthrough upstream; the translator does not touch it
    Upstream,
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    index: usize,
    kind: BlockKind,
}

/// A tool call assembled from streamed fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

#[derive(Debug, Default)]
struct AccumulatedToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Accumulates streamed tool call fragments by upstream index.
///
/// Fragments for several parallel calls may interleave; each index collects
/// its own id, name and argument text.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    tool_calls: BTreeMap<u32, AccumulatedToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fragment
    pub fn accumulate(
        &mut self,
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let entry = self.tool_calls.entry(index).or_default();

        if let Some(id) = id.filter(|id| !id.is_empty()) {
            entry.id = Some(id.to_string());
        }
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            entry.name = name.to_string();
        }
        if let Some(arguments) = arguments {
            entry.arguments.push_str(arguments);
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Finish every call in index order.
    ///
    /// Missing ids are generated; empty arguments become `{}`. Arguments that
    /// are not valid JSON are an error.
    pub fn finalize(self) -> Result<Vec<PendingToolCall>, TranslationError> {
        let mut result = Vec::with_capacity(self.tool_calls.len());

        for (index, acc) in self.tool_calls {
            if acc.name.is_empty() {
                return Err(TranslationError::MalformedChunk(format!(
                    "Tool call at index {} has no name",
                    index
                )));
            }

            let arguments = if acc.arguments.trim().is_empty() {
                "{}".to_string()
            } else {
                serde_json::from_str::<Value>(&acc.arguments).map_err(|e| {
                    TranslationError::MalformedArguments(format!(
                        "Tool call at index {}: {}",
                        index, e
                    ))
                })?;
                acc.arguments
            };

            result.push(PendingToolCall {
                id: acc.id.unwrap_or_else(generate_tool_id),
                name: acc.name,
                arguments,
            });
        }

        Ok(result)
    }
}

/// A fresh `toolu_`-style id for providers that do not supply one
pub fn generate_tool_id() -> String {
    format!("toolu_{}", Uuid::new_v4().simple())
}

/// Decode state for one upstream response
#[derive(Debug)]
pub struct DecodeContext {
    frames: SseFrameBuffer,
    lines: SseLineBuffer,
    message_id: String,
    model: String,
    started: bool,
    open: Option<OpenBlock>,
    next_index: usize,
    tool_calls: ToolCallAccumulator,
    saw_tool_use: bool,
    stop_reason: Option<String>,
    stop_sequence: Option<String>,
    input_tokens: Option<u64>,
    output_tokens: u64,
    delta_sent: bool,
    terminated: bool,
}

impl DecodeContext {
    /// Context for a response from `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            frames: SseFrameBuffer::new(),
            lines: SseLineBuffer::new(),
            message_id: format!("msg_{}", Uuid::new_v4().simple()),
            model: model.into(),
            started: false,
            open: None,
            next_index: 0,
            tool_calls: ToolCallAccumulator::new(),
            saw_tool_use: false,
            stop_reason: None,
            stop_sequence: None,
            input_tokens: None,
            output_tokens: 0,
            delta_sent: false,
            terminated: false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// SSE frames completed by `chunk`; an empty chunk flushes the buffer
    pub fn sse_frames(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, TranslationError> {
        if chunk.is_empty() {
            return Ok(self.frames.flush().into_iter().collect());
        }
        Ok(self.frames.feed(chunk)?)
    }

    /// Lines completed by `chunk`; an empty chunk flushes the buffer
    pub fn lines(&mut self, chunk: &[u8]) -> Result<Vec<String>, TranslationError> {
        if chunk.is_empty() {
            return Ok(self.lines.flush().into_iter().collect());
        }
        Ok(self.lines.feed(chunk)?)
    }

    /// Emit `message_start` once
    pub fn ensure_started(&mut self, out: &mut Vec<StreamEvent>) {
        if self.started {
            return;
        }
        self.started = true;
        let mut message = MessageStart::new(self.message_id.clone(), self.model.clone());
        if let Some(input_tokens) = self.input_tokens {
            message.usage.input_tokens = input_tokens;
        }
        out.push(StreamEvent::MessageStart { message });
    }

    /// Append text, opening a text block if needed
    pub fn push_text(&mut self, text: &str, out: &mut Vec<StreamEvent>) {
        if text.is_empty() {
            return;
        }
        let index = self.open_block(BlockKind::Text, out);
        out.push(StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::TextDelta {
                text: text.to_string(),
            },
        });
    }

    /// Append reasoning, opening a thinking block if needed
    pub fn push_thinking(&mut self, thinking: &str, out: &mut Vec<StreamEvent>) {
        if thinking.is_empty() {
            return;
        }
        let index = self.open_block(BlockKind::Thinking, out);
        out.push(StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::ThinkingDelta {
                thinking: thinking.to_string(),
            },
        });
    }

    /// Emit a complete tool_use block: start, the whole input as one delta, stop
    pub fn push_tool_use(
        &mut self,
        id: String,
        name: String,
        arguments: String,
        out: &mut Vec<StreamEvent>,
    ) {
        self.ensure_started(out);
        self.close_block(out);

        let index = self.next_index;
        self.next_index += 1;
        self.saw_tool_use = true;

        out.push(StreamEvent::ContentBlockStart {
            index,
            content_block: BlockStart::ToolUse {
                id,
                name,
                input: json!({}),
            },
        });
        out.push(StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::InputJsonDelta {
                partial_json: arguments,
            },
        });
        out.push(StreamEvent::ContentBlockStop { index });
    }

    /// Record a streamed tool call fragment for emission at finish
    pub fn accumulate_tool_call(
        &mut self,
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        self.tool_calls.accumulate(index, id, name, arguments);
    }

    pub fn set_stop_reason(&mut self, reason: impl Into<String>) {
        self.stop_reason = Some(reason.into());
    }

    /// Record usage; `None` leaves the current value
    pub fn record_usage(&mut self, input_tokens: Option<u64>, output_tokens: Option<u64>) {
        if input_tokens.is_some() {
            self.input_tokens = input_tokens;
        }
        if let Some(output_tokens) = output_tokens {
            self.output_tokens = output_tokens;
        }
    }

    /// Close the open block, if any
    pub fn close_block(&mut self, out: &mut Vec<StreamEvent>) {
        if let Some(block) = self.open.take() {
            out.push(StreamEvent::ContentBlockStop { index: block.index });
        }
    }

    /// Finish the message: flush accumulated tool calls, close the open block,
    /// emit `message_delta` and `message_stop`. Does nothing once terminated.
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>, TranslationError> {
        let mut out = Vec::new();
        if self.terminated {
            return Ok(out);
        }

        let calls = std::mem::take(&mut self.tool_calls).finalize()?;

        self.ensure_started(&mut out);
        for call in calls {
            self.push_tool_use(call.id, call.name, call.arguments, &mut out);
        }
        self.close_block(&mut out);

        if !self.delta_sent {
            let stop_reason = match self.stop_reason.take() {
                Some(reason) if self.saw_tool_use && reason == "end_turn" => "tool_use".to_string(),
                Some(reason) => reason,
                None if self.saw_tool_use => "tool_use".to_string(),
                None => "end_turn".to_string(),
            };
            out.push(StreamEvent::MessageDelta {
                delta: MessageDelta {
                    stop_reason: Some(stop_reason),
                    stop_sequence: self.stop_sequence.take(),
                    ..Default::default()
                },
                usage: DeltaUsage {
                    output_tokens: self.output_tokens,
                    input_tokens: self.input_tokens,
                    ..Default::default()
                },
            });
            self.delta_sent = true;
        }

        out.push(StreamEvent::MessageStop);
        self.terminated = true;
        Ok(out)
    }

    /// Terminate with an error event
    pub fn fail(&mut self, detail: ErrorDetail) -> StreamEvent {
        self.terminated = true;
        StreamEvent::error(detail)
    }

    /// Track an event forwarded verbatim from a canonical upstream, so that
    /// `finish` can still close the message if the upstream stops early.
    pub fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::MessageStart { .. } => self.started = true,
            StreamEvent::ContentBlockStart { index, .. } => {
                self.open = Some(OpenBlock {
                    index: *index,
                    kind: BlockKind::Upstream,
                });
                self.next_index = self.next_index.max(index + 1);
            }
            StreamEvent::ContentBlockStop { index } => {
                if self.open.is_some_and(|block| block.index == *index) {
                    self.open = None;
                }
            }
            StreamEvent::MessageDelta { delta, usage } => {
                self.stop_reason = delta.stop_reason.clone();
                self.output_tokens = usage.output_tokens;
                self.delta_sent = true;
            }
            StreamEvent::MessageStop | StreamEvent::Error { .. } => self.terminated = true,
            StreamEvent::ContentBlockDelta { .. } | StreamEvent::Ping => {}
        }
    }

    fn open_block(&mut self, kind: BlockKind, out: &mut Vec<StreamEvent>) -> usize {
        self.ensure_started(out);

        if let Some(block) = self.open {
            if block.kind == kind {
                return block.index;
            }
            self.close_block(out);
        }

        let index = self.next_index;
        self.next_index += 1;
        self.open = Some(OpenBlock { index, kind });

        let content_block = match kind {
            BlockKind::Thinking => BlockStart::Thinking {
                thinking: String::new(),
                signature: None,
            },
            BlockKind::Text | BlockKind::Upstream => BlockStart::Text {
                text: String::new(),
            },
        };
        out.push(StreamEvent::ContentBlockStart {
            index,
            content_block,
        });
        index
    }
}
