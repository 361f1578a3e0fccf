//! Canonical protocol (Anthropic Messages API)
//!
//! Everything the caller sees is expressed in these types: the request the
//! gateway accepts, the stream events it emits and the aggregated message
//! returned to non-streaming callers.

pub mod aggregate;
pub mod events;
pub mod types;

pub use aggregate::{AggregateError, MessageAggregator, MessageResponse};
pub use events::{
    error_kind_for_status, parse_event_stream, BlockDelta, BlockStart, DeltaUsage, ErrorDetail,
    MessageDelta, MessageStart, StreamEvent, Usage,
};
pub use types::{
    CanonicalRequest, ContentBlock, ImageSource, Message, MessageContent, MessagesRequest, Role,
    SystemPrompt, Tool, ToolChoice, ToolResultContent,
};
