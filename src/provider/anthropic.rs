//! Anthropic Messages API adapter.

use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ColloquyError, Result};
use crate::models::Model;
use crate::types::*;

use super::format::{arguments_to_object, system_text};
use super::http::anthropic_headers;
use super::{ChatRequest, ProviderAdapter, ProviderResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    api_key: String,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// The Messages payload without the transport fields (`model`, `stream`).
    pub(crate) fn render_messages(&self, request: &ChatRequest) -> Value {
        let mut messages: Vec<Value> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => {}
                Role::User => messages.push(json!({
                    "role": "user",
                    "content": build_anthropic_content(&msg.content),
                })),
                Role::Assistant => {
                    let mut content: Vec<Value> = Vec::new();
                    let text = msg.text();
                    if !text.is_empty() {
                        content.push(json!({ "type": "text", "text": text }));
                    }
                    for call in &msg.tool_calls {
                        content.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": arguments_to_object(&call.arguments),
                        }));
                    }
                    if !content.is_empty() {
                        messages.push(json!({ "role": "assistant", "content": content }));
                    }
                }
                Role::Tool => {
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id,
                        "content": msg.text(),
                    });
                    // Consecutive results share one user turn.
                    if let Some(last) = messages.last_mut().filter(|m| is_tool_result_turn(m)) {
                        if let Some(blocks) = last["content"].as_array_mut() {
                            blocks.push(block);
                            continue;
                        }
                    }
                    messages.push(json!({ "role": "user", "content": [block] }));
                }
            }
        }

        let max_tokens = request
            .options
            .max_tokens
            .or(request.model.capabilities.max_output_tokens.filter(|n| *n > 0))
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = json!({
            "messages": messages,
            "max_tokens": max_tokens,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(system) = system_text(&request.messages) {
                obj.insert("system".into(), system.into());
            }
            if let Some(temp) = request.options.temperature {
                obj.insert("temperature".into(), temp.into());
            }
            if !request.tools.is_empty() {
                let tools: Vec<Value> = request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tools.into());
            }
        }
        body
    }

    /// Parse a Messages API response body.
    pub(crate) fn parse_message(&self, slug: &str, raw: &Value) -> Result<ProviderResponse> {
        let data: AnthropicResponse = serde_json::from_value(raw.clone()).map_err(|e| {
            ColloquyError::malformed(format!("{slug}: unexpected response shape: {e}"))
        })?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in data.content {
            match block.r#type.as_str() {
                "text" => content.push_str(block.text.as_deref().unwrap_or_default()),
                "tool_use" => {
                    let (Some(id), Some(name)) = (block.id, block.name) else {
                        return Err(ColloquyError::malformed(format!(
                            "{slug}: tool_use block without id or name"
                        )));
                    };
                    tool_calls.push(ToolCall::new(
                        id,
                        name,
                        block.input.unwrap_or_else(|| json!({})),
                    ));
                }
                _ => {}
            }
        }

        Ok(ProviderResponse {
            content,
            tool_calls,
            usage: data
                .usage
                .map(|u| Usage::new(u.input_tokens, u.output_tokens)),
            finish_reason: data
                .stop_reason
                .as_deref()
                .and_then(FinishReason::from_provider),
        })
    }
}

fn is_tool_result_turn(message: &Value) -> bool {
    message["role"] == "user"
        && message["content"]
            .as_array()
            .and_then(|blocks| blocks.first())
            .is_some_and(|b| b["type"] == "tool_result")
}

impl ProviderAdapter for AnthropicAdapter {
    fn slug(&self) -> &str {
        "anthropic"
    }

    fn completion_url(&self, _model: &Model, _stream: bool) -> String {
        format!("{}/messages", self.base_url)
    }

    fn headers(&self, _url: &str, _body: &[u8]) -> Result<HeaderMap> {
        anthropic_headers(&self.api_key, API_VERSION)
    }

    fn render_payload(&self, request: &ChatRequest, stream: bool) -> Result<Value> {
        let mut body = self.render_messages(request);
        if let Some(obj) = body.as_object_mut() {
            obj.insert("model".into(), request.model.id.clone().into());
            obj.insert("stream".into(), stream.into());
        }
        Ok(body)
    }

    fn parse_response(&self, raw: &Value) -> Result<ProviderResponse> {
        self.parse_message(self.slug(), raw)
    }

    fn parse_stream_event(&self, event: &Value) -> Result<Option<StreamChunk>> {
        let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
        let index = event.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as usize;

        let chunk = match event_type {
            "message_start" => {
                let usage = &event["message"]["usage"];
                usage.get("input_tokens").map(|_| StreamChunk {
                    usage: Some(Usage::new(
                        usage["input_tokens"].as_u64().unwrap_or(0) as u32,
                        usage["output_tokens"].as_u64().unwrap_or(0) as u32,
                    )),
                    ..StreamChunk::default()
                })
            }
            "content_block_start" => {
                let block = &event["content_block"];
                match block["type"].as_str() {
                    Some("tool_use") => Some(StreamChunk {
                        tool_calls: vec![ToolCallDelta {
                            index,
                            id: block["id"].as_str().map(str::to_string),
                            name: block["name"].as_str().map(str::to_string),
                            arguments: String::new(),
                        }],
                        ..StreamChunk::default()
                    }),
                    Some("text") => block["text"]
                        .as_str()
                        .filter(|t| !t.is_empty())
                        .map(StreamChunk::text),
                    _ => None,
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => delta["text"].as_str().map(StreamChunk::text),
                    Some("input_json_delta") => Some(StreamChunk {
                        tool_calls: vec![ToolCallDelta {
                            index,
                            arguments: delta["partial_json"].as_str().unwrap_or("").to_string(),
                            ..ToolCallDelta::default()
                        }],
                        ..StreamChunk::default()
                    }),
                    _ => None,
                }
            }
            "message_delta" => Some(StreamChunk {
                usage: event["usage"]["output_tokens"]
                    .as_u64()
                    .map(|out| Usage::new(0, out as u32)),
                finish_reason: event["delta"]["stop_reason"]
                    .as_str()
                    .and_then(FinishReason::from_provider),
                ..StreamChunk::default()
            }),
            "error" => {
                let message = event["error"]["message"].as_str().unwrap_or("stream error");
                return Err(ColloquyError::Transport {
                    status: None,
                    message: format!("anthropic: {message}"),
                });
            }
            _ => None,
        };

        Ok(chunk.filter(|c| !c.is_empty()))
    }
}

fn build_anthropic_content(parts: &[ContentPart]) -> Value {
    if let [ContentPart::Text { text }] = parts {
        return Value::String(text.clone());
    }

    let content: Vec<Value> = parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({
                "type": "text",
                "text": text,
            }),
            ContentPart::Image(img) => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": img.mime_type,
                    "data": img.data,
                }
            }),
        })
        .collect();

    json!(content)
}

// Internal Anthropic response types

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
