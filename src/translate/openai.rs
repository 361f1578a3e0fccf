//! OpenAI chat-completions translator
//!
//! Serves both OpenAI and OpenRouter; the two differ only in a few request
//! fields and headers, captured by [`OpenAiDialect`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::canonical::{
    error_kind_for_status, CanonicalRequest, ContentBlock, ImageSource, Message, MessagesRequest,
    Role, StreamEvent, ToolChoice,
};
use crate::proxy::headers::{build_upstream_headers, insert_optional, Auth};
use crate::proxy::UpstreamRequest;

use super::{join_url, DecodeContext, TranslationError, Translator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiDialect {
    OpenAi,
    OpenRouter,
}

#[derive(Debug, Clone)]
pub struct OpenAiTranslator {
    dialect: OpenAiDialect,
    base_url: String,
    api_key: String,
    referer: Option<String>,
    title: Option<String>,
}

impl OpenAiTranslator {
    pub fn new(
        dialect: OpenAiDialect,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            dialect,
            base_url: base_url.into(),
            api_key: api_key.into(),
            referer: None,
            title: None,
        }
    }

    /// OpenRouter app attribution (`HTTP-Referer`, `X-Title`)
    pub fn with_attribution(mut self, referer: Option<String>, title: Option<String>) -> Self {
        self.referer = referer;
        self.title = title;
        self
    }
}

// =============================================================================
// Request encoding
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

fn image_url(source: &ImageSource) -> Option<String> {
    match source {
        ImageSource::Base64 { media_type, data } => {
            Some(format!("data:{};base64,{}", media_type, data))
        }
        ImageSource::Url { url } => Some(url.clone()),
        ImageSource::Unsupported => None,
    }
}

/// Convert the conversation, system prompt first
fn convert_messages(request: &MessagesRequest) -> Vec<Value> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        let text = system.as_text();
        if !text.is_empty() {
            messages.push(json!({"role": "system", "content": text}));
        }
    }

    for message in &request.messages {
        match message.role {
            Role::User => convert_user_message(message, &mut messages),
            Role::Assistant => convert_assistant_message(message, &mut messages),
        }
    }

    messages
}

/// Tool results become `tool` messages ahead of the remaining user content
fn convert_user_message(message: &Message, out: &mut Vec<Value>) {
    let mut parts = Vec::new();

    for block in message.content.blocks() {
        match block {
            ContentBlock::Text { text } => parts.push(json!({"type": "text", "text": text})),
            ContentBlock::Image { source } => match image_url(&source) {
                Some(url) => parts.push(json!({"type": "image_url", "image_url": {"url": url}})),
                None => warn!("Dropping image with unsupported source type"),
            },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let mut text = content.map(|c| c.as_text()).unwrap_or_default();
                if is_error == Some(true) && !text.is_empty() {
                    text = format!("Error: {}", text);
                }
                out.push(json!({"role": "tool", "tool_call_id": tool_use_id, "content": text}));
            }
            _ => {}
        }
    }

    if parts.is_empty() {
        return;
    }

    let only_text = parts.iter().all(|p| p["type"] == "text");
    let content = if only_text && parts.len() == 1 {
        parts[0]["text"].clone()
    } else {
        Value::Array(parts)
    };
    out.push(json!({"role": "user", "content": content}));
}

fn convert_assistant_message(message: &Message, out: &mut Vec<Value>) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in message.content.blocks() {
        match block {
            ContentBlock::Text { text: more } => text.push_str(&more),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": input.to_string()},
            })),
            _ => {}
        }
    }

    if text.is_empty() && tool_calls.is_empty() {
        return;
    }

    let mut assistant = json!({
        "role": "assistant",
        "content": if text.is_empty() { Value::Null } else { Value::String(text) },
    });
    if !tool_calls.is_empty() {
        assistant["tool_calls"] = Value::Array(tool_calls);
    }
    out.push(assistant);
}

fn convert_tools(request: &MessagesRequest) -> Vec<Value> {
    request
        .custom_tools()
        .map(|tool| {
            let parameters = if tool.input_schema.is_null() {
                json!({"type": "object", "properties": {}})
            } else {
                tool.input_schema.clone()
            };
            let mut function = json!({"name": tool.name, "parameters": parameters});
            if let Some(description) = &tool.description {
                function["description"] = Value::String(description.clone());
            }
            json!({"type": "function", "function": function})
        })
        .collect()
}

fn convert_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any => json!("required"),
        ToolChoice::Tool { name } => json!({"type": "function", "function": {"name": name}}),
        ToolChoice::None => json!("none"),
    }
}

// =============================================================================
// Stream decoding
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    /// OpenRouter
    #[serde(default)]
    reasoning: Option<String>,
    /// DeepSeek-style compatible servers
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallFragment>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallFragment {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionFragment>,
}

#[derive(Debug, Deserialize)]
struct FunctionFragment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<Value>,
}

impl ChunkError {
    fn into_translation_error(self) -> TranslationError {
        // OpenRouter puts the HTTP status in `code`; OpenAI uses string codes
        let status = self
            .code
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok());
        TranslationError::Upstream {
            kind: status.map_or("api_error", error_kind_for_status).to_string(),
            message: if self.message.is_empty() {
                "Upstream reported an error".to_string()
            } else {
                self.message
            },
            status,
        }
    }
}

/// Map a chat-completions finish reason to a canonical stop reason
pub fn map_finish_reason(reason: &str) -> &'static str {
    match reason {
        "length" => "max_tokens",
        "tool_calls" | "function_call" => "tool_use",
        "content_filter" => "refusal",
        _ => "end_turn",
    }
}

impl Translator for OpenAiTranslator {
    fn encode_request(
        &self,
        request: &CanonicalRequest,
        model: &str,
    ) -> Result<UpstreamRequest, TranslationError> {
        let message = request.message();
        let tools = convert_tools(message);
        let tool_choice = if tools.is_empty() {
            None
        } else {
            message.tool_choice.as_ref().map(convert_tool_choice)
        };

        let (max_tokens, max_completion_tokens, top_k) = match self.dialect {
            OpenAiDialect::OpenAi => (None, message.max_tokens, None),
            OpenAiDialect::OpenRouter => (message.max_tokens, None, message.top_k),
        };

        let body = ChatRequest {
            model: model.to_string(),
            messages: convert_messages(message),
            max_tokens,
            max_completion_tokens,
            temperature: message.temperature,
            top_p: message.top_p,
            top_k,
            stop: message.stop_sequences.clone().filter(|s| !s.is_empty()),
            tools,
            tool_choice,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        let mut headers = build_upstream_headers(Auth::Bearer(&self.api_key))?;
        if self.dialect == OpenAiDialect::OpenRouter {
            insert_optional(&mut headers, "http-referer", self.referer.as_deref())?;
            insert_optional(&mut headers, "x-title", self.title.as_deref())?;
        }

        Ok(UpstreamRequest {
            url: join_url(&self.base_url, "chat/completions"),
            headers,
            body: serde_json::to_value(body)?,
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
            let data = frame.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                out.extend(ctx.finish()?);
                break;
            }

            let parsed: ChatChunk = serde_json::from_str(data)
                .map_err(|e| TranslationError::MalformedChunk(e.to_string()))?;

            if let Some(error) = parsed.error {
                return Err(error.into_translation_error());
            }

            ctx.ensure_started(&mut out);

            if let Some(usage) = parsed.usage {
                ctx.record_usage(Some(usage.prompt_tokens), Some(usage.completion_tokens));
            }

            for choice in parsed.choices {
                let delta = choice.delta;
                if let Some(reasoning) = delta.reasoning.or(delta.reasoning_content) {
                    ctx.push_thinking(&reasoning, &mut out);
                }
                if let Some(content) = delta.content {
                    ctx.push_text(&content, &mut out);
                }
                for call in delta.tool_calls.into_iter().flatten() {
                    let (name, arguments) = match call.function {
                        Some(f) => (f.name, f.arguments),
                        None => (None, None),
                    };
                    ctx.accumulate_tool_call(
                        call.index,
                        call.id.as_deref(),
                        name.as_deref(),
                        arguments.as_deref(),
                    );
                }
                if let Some(reason) = choice.finish_reason {
                    ctx.set_stop_reason(map_finish_reason(&reason));
                }
            }
        }

        Ok(out)
    }
}
