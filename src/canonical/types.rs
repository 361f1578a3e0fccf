//! Canonical request types
//!
//! Defines the Messages API request the gateway accepts from its callers:
//! roles, content blocks, tool specs and sampling parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message participant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the human
    User,
    /// Message from the model
    Assistant,
}

/// Source of an image block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Inline base64 payload
    Base64 { media_type: String, data: String },
    /// Remote image reference
    Url { url: String },
    /// Any source kind the adapted providers cannot express (files API, etc.)
    #[serde(other)]
    Unsupported,
}

/// Content of a tool result - plain text or nested blocks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ToolResultContent {
    /// Concatenate the textual parts of the result
    pub fn as_text(&self) -> String {
        match self {
            ToolResultContent::Text(text) => text.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single content block inside a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<ToolResultContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
    /// Block types only the native upstream understands (documents, server tools, ...).
    /// The passthrough path forwards them from the raw body; adapted providers drop them.
    #[serde(other)]
    Unsupported,
}

/// Message content - either plain text or a list of blocks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// View the content as blocks; plain text becomes a single text block
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match self {
            MessageContent::Text(text) => vec![ContentBlock::Text { text: text.clone() }],
            MessageContent::Blocks(blocks) => blocks.clone(),
        }
    }
}

/// A chat message with role and content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

/// A text block of a structured system prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemBlock {
    pub text: String,
}

/// System prompt - a string or a list of text blocks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Flatten to a single string, blocks joined by newlines
    pub fn as_text(&self) -> String {
        match self {
            SystemPrompt::Text(text) => text.clone(),
            SystemPrompt::Blocks(blocks) => blocks
                .iter()
                .map(|block| block.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Tool definition offered to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
    /// Set for server-side tools (`web_search_20250305`, ...); absent or `custom` for client tools
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Tool {
    /// Whether this is a client tool with a JSON schema, as opposed to a server tool
    pub fn is_custom(&self) -> bool {
        matches!(self.kind.as_deref(), None | Some("custom"))
    }
}

/// Tool choice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Any,
    Tool { name: String },
    None,
}

/// Messages API request body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagesRequest {
    /// Model string, possibly carrying a provider hint (`openai/gpt-4o`)
    #[serde(default)]
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl MessagesRequest {
    /// Client tools declared on the request (server tools are excluded)
    pub fn custom_tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter().flatten().filter(|tool| tool.is_custom())
    }
}

/// A received request: the typed view plus the exact JSON it came from.
///
/// Immutable once constructed. The raw body lets the passthrough path forward
/// fields the typed view does not model.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    message: MessagesRequest,
    raw: Value,
}

impl CanonicalRequest {
    /// Parse a request body
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: Value = serde_json::from_slice(body)?;
        Self::from_value(raw)
    }

    /// Build from an already-parsed JSON value
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let message = MessagesRequest::deserialize(&raw)?;
        Ok(Self { message, raw })
    }

    pub fn message(&self) -> &MessagesRequest {
        &self.message
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn model(&self) -> &str {
        &self.message.model
    }

    pub fn is_streaming(&self) -> bool {
        self.message.stream
    }
}
