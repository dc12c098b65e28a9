//! OpenAI Chat Completions adapter.
//!
//! Also the base for every OpenAI-compatible API (see `deepseek`).

use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ColloquyError, Result};
use crate::models::Model;
use crate::types::*;

use super::format::arguments_to_string;
use super::http::bearer_headers;
use super::{ChatRequest, ProviderAdapter, ProviderResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    slug: String,
    api_key: String,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self::compatible("openai", api_key, base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()))
    }

    /// Adapter for an OpenAI-compatible API under another slug.
    pub fn compatible(
        slug: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn completion_url(&self, _model: &Model, _stream: bool) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn headers(&self, _url: &str, _body: &[u8]) -> Result<HeaderMap> {
        bearer_headers(&self.api_key)
    }

    fn render_payload(&self, request: &ChatRequest, stream: bool) -> Result<Value> {
        let messages: Vec<Value> = request.messages.iter().map(message_to_openai).collect();

        let mut body = json!({
            "model": request.model.id,
            "messages": messages,
            "stream": stream,
        });
        let obj = body
            .as_object_mut()
            .ok_or_else(|| ColloquyError::InvalidState("payload is not an object".into()))?;

        if let Some(temp) = request.options.temperature {
            obj.insert("temperature".into(), temp.into());
        }
        if let Some(max) = request.options.max_tokens {
            obj.insert("max_tokens".into(), max.into());
        }
        if stream {
            obj.insert("stream_options".into(), json!({ "include_usage": true }));
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), tools.into());
        }

        Ok(body)
    }

    fn parse_response(&self, raw: &Value) -> Result<ProviderResponse> {
        let data: OpenAiChatResponse = serde_json::from_value(raw.clone()).map_err(|e| {
            ColloquyError::malformed(format!("{}: unexpected response shape: {e}", self.slug))
        })?;
        let choice = data.choices.into_iter().next().ok_or_else(|| {
            ColloquyError::malformed(format!("{}: no choices in response", self.slug))
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                ToolCall::new(
                    tc.id,
                    tc.function.name,
                    ToolCall::parse_arguments(&tc.function.arguments),
                )
            })
            .collect();

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: data.usage.map(Into::into),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .and_then(FinishReason::from_provider),
        })
    }

    fn parse_stream_event(&self, event: &Value) -> Result<Option<StreamChunk>> {
        let chunk: OpenAiStreamChunk = serde_json::from_value(event.clone()).map_err(|e| {
            ColloquyError::malformed(format!("{}: unexpected stream event: {e}", self.slug))
        })?;

        let mut out = StreamChunk {
            usage: chunk.usage.map(Into::into),
            ..StreamChunk::default()
        };
        if let Some(choice) = chunk.choices.into_iter().next() {
            out.content = choice.delta.content.unwrap_or_default();
            out.finish_reason = choice
                .finish_reason
                .as_deref()
                .and_then(FinishReason::from_provider);
            out.tool_calls = choice
                .delta
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name: tc.function.as_ref().and_then(|f| f.name.clone()),
                    arguments: tc
                        .function
                        .and_then(|f| f.arguments)
                        .unwrap_or_default(),
                })
                .collect();
        }

        Ok((!out.is_empty()).then_some(out))
    }
}

fn message_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id,
            "content": msg.text(),
        }),
        Role::Assistant if msg.has_tool_calls() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": arguments_to_string(&tc.arguments),
                        }
                    })
                })
                .collect();
            let text = msg.text();
            json!({
                "role": "assistant",
                "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                "tool_calls": calls,
            })
        }
        role if msg.has_images() => {
            let parts: Vec<Value> = msg
                .content
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                    ContentPart::Image(img) => json!({
                        "type": "image_url",
                        "image_url": { "url": img.data_url() },
                    }),
                })
                .collect();
            json!({ "role": role.to_string(), "content": parts })
        }
        role => json!({ "role": role.to_string(), "content": msg.text() }),
    }
}

// OpenAI API response types (internal)

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<OpenAiUsage> for Usage {
    fn from(u: OpenAiUsage) -> Self {
        Usage::new(u.prompt_tokens, u.completion_tokens)
    }
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiStreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::builtin_models;
    use crate::provider::ToolSchema;
    use pretty_assertions::assert_eq;

    fn nano() -> Model {
        builtin_models()
            .into_iter()
            .find(|m| m.id == "gpt-4.1-nano")
            .unwrap()
    }

    fn adapter() -> OpenAiAdapter {
        OpenAiAdapter::new("sk-test", None)
    }

    #[test]
    fn renders_history_tools_and_options() {
        let mut assistant = Message::assistant("");
        assistant.tool_calls = vec![ToolCall::new("call_1", "calculator", json!({"expression": "2+2"}))];
        let mut request = ChatRequest::new(
            nano(),
            vec![
                Message::system("be brief"),
                Message::user("2+2?"),
                assistant,
                Message::tool_result("call_1", "4"),
            ],
        );
        request.options = GenerationOptions::builder().temperature(0.3).build();
        request.tools.push(ToolSchema {
            name: "calculator".into(),
            description: "math".into(),
            parameters: json!({"type": "object"}),
        });

        let body = adapter().render_payload(&request, false).unwrap();

        assert_eq!(body["model"], "gpt-4.1-nano");
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(body["messages"][2]["content"], Value::Null);
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"expression\":\"2+2\"}"
        );
        assert_eq!(
            body["messages"][3],
            json!({"role": "tool", "tool_call_id": "call_1", "content": "4"})
        );
        assert_eq!(body["tools"][0]["function"]["name"], "calculator");
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn streaming_requests_ask_for_usage() {
        let request = ChatRequest::new(nano(), vec![Message::user("hi")]);
        let body = adapter().render_payload(&request, true).unwrap();

        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn images_become_content_parts() {
        let request = ChatRequest::new(
            nano(),
            vec![Message::user_with_images(
                "what is this",
                vec![ImageContent::from_bytes(b"abc", "image/png")],
            )],
        );
        let body = adapter().render_payload(&request, false).unwrap();

        assert_eq!(body["messages"][0]["content"][1]["image_url"]["url"], "data:image/png;base64,YWJj");
    }

    #[test]
    fn parses_text_tool_calls_and_usage() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "calculator", "arguments": "{\"expression\":\"1+1\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25}
        });

        let response = adapter().parse_response(&raw).unwrap();

        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls[0].id, "call_9");
        assert_eq!(response.tool_calls[0].arguments, json!({"expression": "1+1"}));
        assert_eq!(response.usage, Some(Usage::new(20, 5)));
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn missing_choices_is_malformed() {
        let err = adapter().parse_response(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, ColloquyError::MalformedResponse(_)));

        let err = adapter().parse_response(&json!({"id": "x"})).unwrap_err();
        assert!(matches!(err, ColloquyError::MalformedResponse(_)));
    }

    #[test]
    fn parses_stream_deltas() {
        let text = adapter()
            .parse_stream_event(&json!({"choices": [{"delta": {"content": "Hi"}, "finish_reason": null}]}))
            .unwrap()
            .unwrap();
        assert_eq!(text.content, "Hi");

        let tool = adapter()
            .parse_stream_event(&json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "c", "function": {"name": "f", "arguments": "{"}}
            ]}}]}))
            .unwrap()
            .unwrap();
        assert_eq!(tool.tool_calls[0].name.as_deref(), Some("f"));

        let usage = adapter()
            .parse_stream_event(&json!({"choices": [], "usage": {"prompt_tokens": 3, "completion_tokens": 2}}))
            .unwrap()
            .unwrap();
        assert_eq!(usage.usage, Some(Usage::new(3, 2)));

        let empty = adapter()
            .parse_stream_event(&json!({"choices": [{"delta": {}}]}))
            .unwrap();
        assert!(empty.is_none());
    }

    #[test]
    fn bearer_auth_header() {
        let headers = adapter().headers("", b"").unwrap();
        assert_eq!(headers["authorization"], "Bearer sk-test");
    }
}
