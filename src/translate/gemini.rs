//! Gemini `streamGenerateContent` translator

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::canonical::{
    error_kind_for_status, CanonicalRequest, ContentBlock, ImageSource, MessagesRequest, Role,
    StreamEvent, ToolChoice,
};
use crate::proxy::headers::{build_upstream_headers, Auth};
use crate::proxy::UpstreamRequest;

use super::context::generate_tool_id;
use super::{join_url, DecodeContext, TranslationError, Translator};

#[derive(Debug, Clone)]
pub struct GeminiTranslator {
    base_url: String,
    api_key: String,
}

impl GeminiTranslator {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

// =============================================================================
// Request encoding
// =============================================================================

/// Tool names by tool_use id; `functionResponse` needs the name, tool_result
/// only carries the id.
fn tool_names_by_id(request: &MessagesRequest) -> HashMap<String, String> {
    request
        .messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| m.content.blocks())
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, .. } => Some((id, name)),
            _ => None,
        })
        .collect()
}

fn convert_contents(request: &MessagesRequest) -> Vec<Value> {
    let names = tool_names_by_id(request);
    let mut contents = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        let mut parts = Vec::new();

        for block in message.content.blocks() {
            match block {
                ContentBlock::Text { text } if !text.is_empty() => {
                    parts.push(json!({"text": text}))
                }
                ContentBlock::Image { source } => match source {
                    ImageSource::Base64 { media_type, data } => parts.push(json!({
                        "inlineData": {"mimeType": media_type, "data": data}
                    })),
                    _ => warn!("Dropping image without inline data; Gemini needs base64 images"),
                },
                ContentBlock::ToolUse { name, input, .. } => parts.push(json!({
                    "functionCall": {"name": name, "args": input}
                })),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    let name = names.get(&tool_use_id).cloned().unwrap_or_else(|| {
                        warn!(tool_use_id = %tool_use_id, "tool_result without matching tool_use");
                        tool_use_id.clone()
                    });
                    let text = content.map(|c| c.as_text()).unwrap_or_default();
                    let key = if is_error == Some(true) { "error" } else { "content" };
                    parts.push(json!({
                        "functionResponse": {"name": name, "response": {key: text}}
                    }));
                }
                _ => {}
            }
        }

        if parts.is_empty() {
            continue;
        }
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        contents.push(json!({"role": role, "parts": parts}));
    }

    contents
}

fn is_empty_object_schema(schema: &Value) -> bool {
    let Some(object) = schema.as_object() else {
        return false;
    };
    object.get("type").and_then(Value::as_str) == Some("object")
        && object
            .get("properties")
            .and_then(Value::as_object)
            .map_or(true, Map::is_empty)
}

/// Reduce a JSON Schema to the OpenAPI subset Gemini accepts.
///
/// Only known keys are copied; `$schema`, `additionalProperties`, `default`,
/// `examples` and the like are dropped. `const` becomes a one-value `enum` and
/// nullable type unions become `nullable`. An empty object schema at the root
/// yields `None` since Gemini rejects objects without properties.
pub fn sanitize_schema(schema: &Value, is_root: bool) -> Option<Value> {
    if is_empty_object_schema(schema) {
        return if is_root {
            None
        } else {
            Some(json!({"type": "object"}))
        };
    }

    let object = schema.as_object()?;
    let mut result = Map::new();

    for key in [
        "description",
        "required",
        "format",
        "enum",
        "minItems",
        "maxItems",
        "minimum",
        "maximum",
        "minLength",
        "maxLength",
        "pattern",
        "nullable",
    ] {
        if let Some(value) = object.get(key) {
            result.insert(key.to_string(), value.clone());
        }
    }

    if let Some(value) = object.get("const").filter(|v| !v.is_null()) {
        result.insert("enum".to_string(), Value::Array(vec![value.clone()]));
    }

    match object.get("type") {
        Some(Value::String(kind)) => {
            result.insert("type".to_string(), Value::String(kind.clone()));
        }
        Some(Value::Array(kinds)) => {
            let non_null: Vec<_> = kinds
                .iter()
                .filter_map(Value::as_str)
                .filter(|k| *k != "null")
                .collect();
            if non_null.len() < kinds.len() {
                result.insert("nullable".to_string(), Value::Bool(true));
            }
            match non_null.as_slice() {
                [] => {}
                [single] => {
                    result.insert("type".to_string(), json!(single));
                }
                many => {
                    let any_of = many.iter().map(|k| json!({"type": k})).collect();
                    result.insert("anyOf".to_string(), Value::Array(any_of));
                }
            }
        }
        _ => {}
    }

    if let Some(properties) = object.get("properties").and_then(Value::as_object) {
        let converted: Map<String, Value> = properties
            .iter()
            .filter_map(|(name, prop)| sanitize_schema(prop, false).map(|p| (name.clone(), p)))
            .collect();
        result.insert("properties".to_string(), Value::Object(converted));
    }

    if let Some(items) = object.get("items").and_then(|i| sanitize_schema(i, false)) {
        result.insert("items".to_string(), items);
    }

    for union in ["anyOf", "oneOf"] {
        if let Some(variants) = object.get(union).and_then(Value::as_array) {
            let converted = variants
                .iter()
                .filter_map(|v| sanitize_schema(v, false))
                .collect();
            result.insert("anyOf".to_string(), Value::Array(converted));
        }
    }

    Some(Value::Object(result))
}

fn convert_tools(request: &MessagesRequest) -> Option<Value> {
    let declarations: Vec<Value> = request
        .custom_tools()
        .map(|tool| {
            let mut declaration = json!({"name": tool.name});
            if let Some(description) = &tool.description {
                declaration["description"] = Value::String(description.clone());
            }
            if let Some(parameters) = sanitize_schema(&tool.input_schema, true) {
                declaration["parameters"] = parameters;
            }
            declaration
        })
        .collect();

    if declarations.is_empty() {
        None
    } else {
        Some(json!([{"functionDeclarations": declarations}]))
    }
}

fn convert_tool_config(choice: &ToolChoice) -> Value {
    let config = match choice {
        ToolChoice::Auto => json!({"mode": "AUTO"}),
        ToolChoice::Any => json!({"mode": "ANY"}),
        ToolChoice::Tool { name } => json!({"mode": "ANY", "allowedFunctionNames": [name]}),
        ToolChoice::None => json!({"mode": "NONE"}),
    };
    json!({"functionCallingConfig": config})
}

fn generation_config(request: &MessagesRequest) -> Map<String, Value> {
    let mut config = Map::new();
    if let Some(max_tokens) = request.max_tokens {
        config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if let Some(temperature) = request.temperature {
        config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = request.top_p {
        config.insert("topP".to_string(), json!(top_p));
    }
    if let Some(top_k) = request.top_k {
        config.insert("topK".to_string(), json!(top_k));
    }
    if let Some(stop) = request.stop_sequences.as_ref().filter(|s| !s.is_empty()) {
        config.insert("stopSequences".to_string(), json!(stop));
    }
    config
}

// =============================================================================
// Stream decoding
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
    #[serde(default)]
    thoughts_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

/// Map a Gemini finish reason to a canonical stop reason
pub fn map_finish_reason(reason: &str) -> &'static str {
    match reason {
        "MAX_TOKENS" => "max_tokens",
        "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII" => "refusal",
        _ => "end_turn",
    }
}

/// The JSON payload of one stream line: SSE `data:` lines and bare NDJSON
/// objects are both accepted.
fn payload(line: &str) -> Option<&str> {
    let line = line.trim();
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.trim();
        return (!data.is_empty()).then_some(data);
    }
    line.starts_with('{').then_some(line)
}

impl Translator for GeminiTranslator {
    fn encode_request(
        &self,
        request: &CanonicalRequest,
        model: &str,
    ) -> Result<UpstreamRequest, TranslationError> {
        let message = request.message();
        let mut body = json!({"contents": convert_contents(message)});

        if let Some(system) = &message.system {
            let text = system.as_text();
            if !text.is_empty() {
                body["systemInstruction"] = json!({"parts": [{"text": text}]});
            }
        }

        let config = generation_config(message);
        if !config.is_empty() {
            body["generationConfig"] = Value::Object(config);
        }

        if let Some(tools) = convert_tools(message) {
            body["tools"] = tools;
            if let Some(choice) = &message.tool_choice {
                body["toolConfig"] = convert_tool_config(choice);
            }
        }

        let headers = build_upstream_headers(Auth::ApiKey {
            header: "x-goog-api-key",
            key: &self.api_key,
        })?;

        Ok(UpstreamRequest {
            url: join_url(
                &self.base_url,
                &format!("v1beta/models/{}:streamGenerateContent?alt=sse", model),
            ),
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

        for line in ctx.lines(chunk)? {
            let Some(data) = payload(&line) else {
                continue;
            };

            let parsed: GenerateChunk = serde_json::from_str(data)
                .map_err(|e| TranslationError::MalformedChunk(e.to_string()))?;

            if let Some(error) = parsed.error {
                return Err(TranslationError::Upstream {
                    kind: error.code.map_or("api_error", error_kind_for_status).to_string(),
                    message: error.message,
                    status: error.code,
                });
            }

            ctx.ensure_started(&mut out);

            if let Some(usage) = parsed.usage_metadata {
                let output = match (usage.candidates_token_count, usage.thoughts_token_count) {
                    (None, None) => None,
                    (candidates, thoughts) => {
                        Some(candidates.unwrap_or(0) + thoughts.unwrap_or(0))
                    }
                };
                ctx.record_usage(usage.prompt_token_count, output);
            }

            let mut finish_reason = None;
            for candidate in parsed.candidates.into_iter().take(1) {
                for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                    if let Some(call) = part.function_call {
                        let arguments = if call.args.is_null() {
                            "{}".to_string()
                        } else {
                            call.args.to_string()
                        };
                        ctx.push_tool_use(generate_tool_id(), call.name, arguments, &mut out);
                    } else if let Some(text) = part.text {
                        if part.thought == Some(true) {
                            ctx.push_thinking(&text, &mut out);
                        } else {
                            ctx.push_text(&text, &mut out);
                        }
                    }
                }
                finish_reason = candidate.finish_reason;
            }

            if let Some(reason) = finish_reason {
                ctx.set_stop_reason(map_finish_reason(&reason));
                out.extend(ctx.finish()?);
                break;
            }
        }

        Ok(out)
    }
}
