//! Google Gemini API adapter.

use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ColloquyError, Result};
use crate::models::Model;
use crate::types::*;

use super::format::{arguments_to_object, system_text, tool_name_for};
use super::http::google_headers;
use super::{ChatRequest, ProviderAdapter, ProviderResponse};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    api_key: String,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn slug(&self) -> &str {
        "gemini"
    }

    fn completion_url(&self, model: &Model, stream: bool) -> String {
        if stream {
            format!("{}/models/{}:streamGenerateContent?alt=sse", self.base_url, model.id)
        } else {
            format!("{}/models/{}:generateContent", self.base_url, model.id)
        }
    }

    fn headers(&self, _url: &str, _body: &[u8]) -> Result<HeaderMap> {
        google_headers(&self.api_key)
    }

    fn render_payload(&self, request: &ChatRequest, _stream: bool) -> Result<Value> {
        let mut contents: Vec<Value> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => {}
                Role::User => contents.push(json!({
                    "role": "user",
                    "parts": build_gemini_parts(&msg.content),
                })),
                Role::Assistant => {
                    let mut parts = build_gemini_parts(&msg.content);
                    for call in &msg.tool_calls {
                        parts.push(json!({
                            "functionCall": {
                                "name": call.name,
                                "args": arguments_to_object(&call.arguments),
                            }
                        }));
                    }
                    if !parts.is_empty() {
                        contents.push(json!({ "role": "model", "parts": parts }));
                    }
                }
                Role::Tool => {
                    let call_id = msg.tool_call_id.as_deref().unwrap_or_default();
                    let name = tool_name_for(&request.messages, call_id).unwrap_or(call_id);
                    let part = json!({
                        "functionResponse": {
                            "name": name,
                            "response": { "name": name, "content": msg.text() },
                        }
                    });
                    // Consecutive results share one user turn.
                    if let Some(last) = contents.last_mut().filter(|c| is_function_response_turn(c)) {
                        if let Some(parts) = last["parts"].as_array_mut() {
                            parts.push(part);
                            continue;
                        }
                    }
                    contents.push(json!({ "role": "user", "parts": [part] }));
                }
            }
        }

        let mut body = json!({ "contents": contents });
        let obj = body
            .as_object_mut()
            .ok_or_else(|| ColloquyError::InvalidState("payload is not an object".into()))?;

        if let Some(system) = system_text(&request.messages) {
            obj.insert("systemInstruction".into(), json!({ "parts": [{ "text": system }] }));
        }

        let mut gen_config = serde_json::Map::new();
        if let Some(max) = request.options.max_tokens {
            gen_config.insert("maxOutputTokens".into(), max.into());
        }
        if let Some(temp) = request.options.temperature {
            gen_config.insert("temperature".into(), temp.into());
        }
        if !gen_config.is_empty() {
            obj.insert("generationConfig".into(), Value::Object(gen_config));
        }

        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": strip_unsupported_schema_keys(&t.parameters),
                    })
                })
                .collect();
            obj.insert("tools".into(), json!([{ "functionDeclarations": declarations }]));
        }

        Ok(body)
    }

    fn parse_response(&self, raw: &Value) -> Result<ProviderResponse> {
        let data: GeminiResponse = serde_json::from_value(raw.clone()).map_err(|e| {
            ColloquyError::malformed(format!("gemini: unexpected response shape: {e}"))
        })?;
        let candidate = data
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ColloquyError::malformed("gemini: no candidates in response"))?;

        let (content, tool_calls) = collect_parts(candidate.content);
        Ok(ProviderResponse {
            content,
            tool_calls,
            usage: data.usage_metadata.map(Into::into),
            finish_reason: candidate
                .finish_reason
                .as_deref()
                .and_then(FinishReason::from_provider),
        })
    }

    fn parse_stream_event(&self, event: &Value) -> Result<Option<StreamChunk>> {
        let data: GeminiResponse = serde_json::from_value(event.clone()).map_err(|e| {
            ColloquyError::malformed(format!("gemini: unexpected stream event: {e}"))
        })?;

        let mut chunk = StreamChunk {
            usage: data.usage_metadata.map(Into::into),
            ..StreamChunk::default()
        };
        if let Some(candidate) = data.candidates.and_then(|c| c.into_iter().next()) {
            chunk.finish_reason = candidate
                .finish_reason
                .as_deref()
                .and_then(FinishReason::from_provider);
            let (content, calls) = collect_parts(candidate.content);
            chunk.content = content;
            chunk.tool_calls = calls
                .into_iter()
                .enumerate()
                .map(|(index, call)| ToolCallDelta {
                    index,
                    id: Some(call.id),
                    name: Some(call.name),
                    arguments: call.arguments.to_string(),
                })
                .collect();
        }

        Ok((!chunk.is_empty()).then_some(chunk))
    }
}

fn is_function_response_turn(content: &Value) -> bool {
    content["role"] == "user"
        && content["parts"]
            .as_array()
            .and_then(|parts| parts.first())
            .is_some_and(|p| p.get("functionResponse").is_some())
}

/// Gemini rejects some JSON-schema keywords that other providers accept.
fn strip_unsupported_schema_keys(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "additionalProperties" | "$schema"))
                .map(|(k, v)| (k.clone(), strip_unsupported_schema_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_unsupported_schema_keys).collect()),
        other => other.clone(),
    }
}

/// Gemini issues no call ids, so each call gets a generated one.
fn collect_parts(content: Option<GeminiContent>) -> (String, Vec<ToolCall>) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in content.map(|c| c.parts).unwrap_or_default() {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(fc) = part.function_call {
            tool_calls.push(ToolCall::new(
                uuid::Uuid::new_v4().to_string(),
                fc.name,
                fc.args.unwrap_or_else(|| json!({})),
            ));
        }
    }
    (text, tool_calls)
}

fn build_gemini_parts(content: &[ContentPart]) -> Vec<Value> {
    content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if text.is_empty() => None,
            ContentPart::Text { text } => Some(json!({ "text": text })),
            ContentPart::Image(img) => Some(json!({
                "inlineData": {
                    "mimeType": img.mime_type,
                    "data": img.data,
                }
            })),
        })
        .collect()
}

// Internal Gemini response types

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl From<GeminiUsage> for Usage {
    fn from(u: GeminiUsage) -> Self {
        Usage::new(u.prompt_token_count, u.candidates_token_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::builtin_models;
    use crate::provider::ToolSchema;
    use pretty_assertions::assert_eq;

    fn flash() -> Model {
        builtin_models()
            .into_iter()
            .find(|m| m.id == "gemini-2.0-flash")
            .unwrap()
    }

    fn adapter() -> GeminiAdapter {
        GeminiAdapter::new("g-key", None)
    }

    #[test]
    fn urls_switch_on_streaming() {
        let a = adapter();
        assert_eq!(
            a.completion_url(&flash(), false),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert!(a
            .completion_url(&flash(), true)
            .ends_with(":streamGenerateContent?alt=sse"));
        assert_eq!(a.headers("", b"").unwrap()["x-goog-api-key"], "g-key");
    }

    #[test]
    fn maps_roles_system_instruction_and_function_responses() {
        let mut assistant = Message::assistant("");
        assistant.tool_calls = vec![ToolCall::new("id-1", "weather", json!({"city": "Rome"}))];
        let mut request = ChatRequest::new(
            flash(),
            vec![
                Message::system("terse"),
                Message::user("weather?"),
                assistant,
                Message::tool_result("id-1", "hot"),
            ],
        );
        request.options = GenerationOptions::builder().max_tokens(100).build();
        request.tools.push(ToolSchema {
            name: "weather".into(),
            description: "forecast".into(),
            parameters: json!({"type": "object", "additionalProperties": false, "properties": {}}),
        });

        let body = adapter().render_payload(&request, false).unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "terse");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["functionCall"]["name"], "weather");
        assert_eq!(
            body["contents"][2]["parts"][0]["functionResponse"]["name"],
            "weather"
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 100);
        let params = &body["tools"][0]["functionDeclarations"][0]["parameters"];
        assert!(params.get("additionalProperties").is_none());
    }

    #[test]
    fn parses_function_calls_with_generated_ids() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "weather", "args": {"city": "Rome"}}},
                    {"functionCall": {"name": "weather", "args": {"city": "Oslo"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 14, "candidatesTokenCount": 6, "totalTokenCount": 20}
        });

        let response = adapter().parse_response(&raw).unwrap();

        assert_eq!(response.tool_calls.len(), 2);
        assert_ne!(response.tool_calls[0].id, response.tool_calls[1].id);
        assert_eq!(response.tool_calls[1].arguments, json!({"city": "Oslo"}));
        assert_eq!(response.usage, Some(Usage::new(14, 6)));
    }

    #[test]
    fn missing_candidates_is_malformed() {
        let err = adapter().parse_response(&json!({"promptFeedback": {}})).unwrap_err();
        assert!(matches!(err, ColloquyError::MalformedResponse(_)));
    }

    #[test]
    fn stream_event_carries_text_and_usage() {
        let chunk = adapter()
            .parse_stream_event(&json!({
                "candidates": [{"content": {"parts": [{"text": "Ciao"}]}}],
                "usageMetadata": {"promptTokenCount": 4}
            }))
            .unwrap()
            .unwrap();

        assert_eq!(chunk.content, "Ciao");
        assert_eq!(chunk.usage, Some(Usage::new(4, 0)));
    }
}
