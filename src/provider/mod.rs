//! Provider adapter trait and implementations.
//!
//! An adapter translates between the normalized message model and one
//! provider's wire format. It never performs I/O itself; the
//! [`Transport`](crate::transport::Transport) sends what the adapter builds.

pub mod format;
pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "deepseek")]
pub mod deepseek;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "bedrock")]
pub mod bedrock;
#[cfg(feature = "bedrock")]
pub mod sigv4;

#[cfg(feature = "gemini")]
pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::{ColloquyError, Result};
use crate::models::{Model, ProviderKey};
use crate::transport::WireRequest;
use crate::types::{FinishReason, GenerationOptions, Message, StreamChunk, ToolCall, Usage};

/// Normalized request handed to an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: Model,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
    #[serde(default)]
    pub options: GenerationOptions,
}

impl ChatRequest {
    pub fn new(model: Model, messages: Vec<Message>) -> Self {
        Self {
            model,
            messages,
            tools: Vec::new(),
            options: GenerationOptions::default(),
        }
    }
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Normalized provider response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Translator between the normalized model and one provider's wire format.
pub trait ProviderAdapter: Send + Sync {
    /// Provider slug (e.g. "openai", "deepseek").
    fn slug(&self) -> &str;

    fn completion_url(&self, model: &Model, stream: bool) -> String;

    /// Request headers, including authentication. `body` is the exact payload
    /// that will be sent, for adapters that sign it.
    fn headers(&self, url: &str, body: &[u8]) -> Result<HeaderMap>;

    fn render_payload(&self, request: &ChatRequest, stream: bool) -> Result<Value>;

    fn parse_response(&self, raw: &Value) -> Result<ProviderResponse>;

    /// Normalize one streamed event. `Ok(None)` for events that carry nothing.
    fn parse_stream_event(&self, event: &Value) -> Result<Option<StreamChunk>>;

    fn supports_streaming(&self) -> bool {
        true
    }

    /// Map a non-success status to an error.
    fn classify_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> ColloquyError {
        http::status_to_error(status, body, retry_after)
    }

    /// Headers to use for one send attempt, or `None` to keep those from
    /// [`build_request`](Self::build_request). Adapters whose signatures
    /// expire re-sign here so retries carry a fresh timestamp.
    fn refresh_headers(&self, _request: &WireRequest) -> Result<Option<HeaderMap>> {
        Ok(None)
    }

    /// Check capabilities, then render the full wire request.
    fn build_request(&self, request: &ChatRequest, stream: bool) -> Result<WireRequest> {
        ensure_capabilities(request, stream, self.supports_streaming())?;
        let url = self.completion_url(&request.model, stream);
        let body = self.render_payload(request, stream)?;
        let bytes = serde_json::to_vec(&body)?;
        let headers = self.headers(&url, &bytes)?;
        Ok(WireRequest { url, headers, body })
    }
}

/// Reject requests that use a feature the model or adapter does not have.
pub fn ensure_capabilities(
    request: &ChatRequest,
    stream: bool,
    adapter_streams: bool,
) -> Result<()> {
    let model = &request.model;
    if !request.tools.is_empty() && !model.supports_tools() {
        return Err(ColloquyError::UnsupportedCapability(format!(
            "model '{}' does not support tool calling",
            model.id
        )));
    }
    if !model.supports_vision() && request.messages.iter().any(Message::has_images) {
        return Err(ColloquyError::UnsupportedCapability(format!(
            "model '{}' does not accept images",
            model.id
        )));
    }
    if stream && !(adapter_streams && model.supports_streaming()) {
        return Err(ColloquyError::UnsupportedCapability(format!(
            "model '{}' does not support streaming",
            model.id
        )));
    }
    Ok(())
}

fn missing(key: ProviderKey, what: &str) -> ColloquyError {
    ColloquyError::Authentication(format!("Missing {what} for provider '{key}'"))
}

/// Create the adapter for a provider from the config's credentials.
#[allow(unused_variables)]
pub fn create_adapter(key: ProviderKey, config: &Config) -> Result<Arc<dyn ProviderAdapter>> {
    let settings = config.provider(key);
    let api_key = || {
        settings
            .and_then(|s| s.api_key.clone())
            .ok_or_else(|| missing(key, "API key"))
    };
    let base_url = settings.and_then(|s| s.base_url.clone());

    match key {
        #[cfg(feature = "openai")]
        ProviderKey::OpenAi => Ok(Arc::new(openai::OpenAiAdapter::new(api_key()?, base_url))),
        #[cfg(feature = "deepseek")]
        ProviderKey::DeepSeek => Ok(Arc::new(deepseek::DeepSeekAdapter::new(
            api_key()?,
            base_url,
        ))),
        #[cfg(feature = "anthropic")]
        ProviderKey::Anthropic => Ok(Arc::new(anthropic::AnthropicAdapter::new(
            api_key()?,
            base_url,
        ))),
        #[cfg(feature = "gemini")]
        ProviderKey::Gemini => Ok(Arc::new(gemini::GeminiAdapter::new(api_key()?, base_url))),
        #[cfg(feature = "bedrock")]
        ProviderKey::Bedrock => {
            let credentials = sigv4::Credentials {
                access_key_id: api_key()?,
                secret_access_key: settings
                    .and_then(|s| s.secret_key.clone())
                    .ok_or_else(|| missing(key, "secret access key"))?,
                session_token: settings.and_then(|s| s.session_token.clone()),
            };
            let region = settings
                .and_then(|s| s.region.clone())
                .ok_or_else(|| {
                    ColloquyError::Configuration("Missing AWS region for provider 'bedrock'".into())
                })?;
            Ok(Arc::new(bedrock::BedrockAdapter::new(
                credentials,
                region,
                base_url,
            )))
        }
        #[allow(unreachable_patterns)]
        _ => Err(ColloquyError::Configuration(format!(
            "Provider '{key}' not enabled via feature flags"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelCapabilities, ModelKind};
    use crate::types::ImageContent;

    fn model(capabilities: ModelCapabilities) -> Model {
        Model {
            id: "m".into(),
            provider: ProviderKey::OpenAi,
            kind: ModelKind::Chat,
            display_name: "m".into(),
            capabilities,
        }
    }

    fn tool() -> ToolSchema {
        ToolSchema {
            name: "t".into(),
            description: "d".into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn tools_require_tool_support() {
        let mut request = ChatRequest::new(model(ModelCapabilities::default()), vec![]);
        request.tools.push(tool());

        assert!(matches!(
            ensure_capabilities(&request, false, true),
            Err(ColloquyError::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn images_require_vision() {
        let request = ChatRequest::new(
            model(ModelCapabilities::default()),
            vec![Message::user_with_images(
                "look",
                vec![ImageContent::from_bytes(b"x", "image/png")],
            )],
        );

        assert!(ensure_capabilities(&request, false, true).is_err());
    }

    #[test]
    fn streaming_requires_adapter_and_model_support() {
        let request = ChatRequest::new(model(ModelCapabilities::full(8_000)), vec![]);

        assert!(ensure_capabilities(&request, true, true).is_ok());
        assert!(ensure_capabilities(&request, true, false).is_err());
        assert!(ensure_capabilities(&request, false, false).is_ok());
    }

    #[test]
    fn missing_credentials_are_authentication_errors() {
        let config = Config::default();
        for key in ProviderKey::ALL {
            let err = create_adapter(key, &config).err().unwrap();
            assert!(
                matches!(err, ColloquyError::Authentication(_)),
                "{key}: {err:?}"
            );
        }
    }
}
