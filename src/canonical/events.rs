//! Canonical stream events
//!
//! The event sequence a streamed Messages response consists of, and its
//! `event: <type>\ndata: <json>\n\n` wire form.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::streaming::{SseFrame, SseFrameBuffer};

/// Event type names, in the order they first appear in a stream
pub const EVENT_TYPES: [&str; 8] = [
    "message_start",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
    "message_delta",
    "message_stop",
    "ping",
    "error",
];

/// Token usage as reported in `message_start`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The message envelope carried by `message_start`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageStart {
    pub id: String,
    #[serde(rename = "type", default = "message_kind")]
    pub kind: String,
    #[serde(default = "assistant_role")]
    pub role: String,
    #[serde(default)]
    pub content: Vec<Value>,
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn message_kind() -> String {
    "message".to_string()
}

fn assistant_role() -> String {
    "assistant".to_string()
}

impl MessageStart {
    /// An empty assistant message shell
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: message_kind(),
            role: assistant_role(),
            content: Vec::new(),
            model: model.into(),
            stop_reason: None,
            stop_sequence: None,
            usage: Usage::default(),
            extra: Map::new(),
        }
    }
}

/// Initial state of a content block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockStart {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
    ServerToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    WebSearchToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
    /// Any other block type, kept as received
    #[serde(untagged)]
    Other(Value),
}

/// Incremental update to an open content block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    CitationsDelta { citation: Value },
    /// Any other delta type, kept as received
    #[serde(untagged)]
    Other(Value),
}

/// Top-level changes carried by `message_delta`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageDelta {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Cumulative usage carried by `message_delta`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeltaUsage {
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Error payload of an `error` event and of error responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    /// Upstream HTTP status, when the error came from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorDetail {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Map an upstream HTTP status to the canonical error type
pub fn error_kind_for_status(status: u16) -> &'static str {
    match status {
        400 | 422 => "invalid_request_error",
        413 => "request_too_large",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        429 => "rate_limit_error",
        503 | 529 => "overloaded_error",
        _ => "api_error",
    }
}

/// One canonical stream event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: usize,
        content_block: BlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDelta,
        #[serde(default)]
        usage: DeltaUsage,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorDetail,
    },
}

impl StreamEvent {
    pub fn error(detail: ErrorDetail) -> Self {
        StreamEvent::Error { error: detail }
    }

    /// The SSE `event:` name for this event
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
            StreamEvent::Ping => "ping",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Whether the event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::MessageStop | StreamEvent::Error { .. })
    }

    pub fn is_known_type(name: &str) -> bool {
        EVENT_TYPES.contains(&name)
    }

    /// Encode as one SSE frame
    pub fn to_sse(&self) -> Bytes {
        let json = serde_json::to_string(self).expect("StreamEvent should always serialize");
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.event_name(), json))
    }

    /// Parse one SSE frame.
    ///
    /// The `type` field of the payload is authoritative; the `event:` name is
    /// only consulted when the payload has none. Returns `Ok(None)` for event
    /// types outside the canonical set.
    pub fn from_sse_frame(frame: &SseFrame) -> Result<Option<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(&frame.data)?;
        Self::from_value(value, frame.event.as_deref())
    }

    /// Parse an already decoded frame payload; `event` is the SSE event name
    pub fn from_value(
        mut value: Value,
        event: Option<&str>,
    ) -> Result<Option<Self>, serde_json::Error> {
        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => match (event, value.as_object_mut()) {
                (Some(event), Some(object)) => {
                    object.insert("type".to_string(), Value::String(event.to_string()));
                    event.to_string()
                }
                _ => return Ok(None),
            },
        };

        if !Self::is_known_type(&kind) {
            return Ok(None);
        }

        serde_json::from_value(value).map(Some)
    }
}

/// Parse a complete canonical event stream body
pub fn parse_event_stream(body: &[u8]) -> Result<Vec<StreamEvent>, serde_json::Error> {
    let mut buffer = SseFrameBuffer::new();
    let mut frames = buffer
        .feed(body)
        .map_err(<serde_json::Error as serde::de::Error>::custom)?;
    frames.extend(buffer.flush());

    let mut events = Vec::with_capacity(frames.len());
    for frame in &frames {
        if let Some(event) = StreamEvent::from_sse_frame(frame)? {
            events.push(event);
        }
    }
    Ok(events)
}
