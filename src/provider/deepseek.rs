//! DeepSeek adapter (OpenAI-compatible).

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::error::{ColloquyError, Result};
use crate::models::Model;
use crate::types::StreamChunk;

use super::openai::OpenAiAdapter;
use super::{ChatRequest, ProviderAdapter, ProviderResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

#[derive(Debug, Clone)]
pub struct DeepSeekAdapter {
    inner: OpenAiAdapter,
}

impl DeepSeekAdapter {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            inner: OpenAiAdapter::compatible(
                "deepseek",
                api_key,
                base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            ),
        }
    }
}

impl ProviderAdapter for DeepSeekAdapter {
    fn slug(&self) -> &str { self.inner.slug() }
    fn completion_url(&self, model: &Model, stream: bool) -> String {
        self.inner.completion_url(model, stream)
    }
    fn headers(&self, url: &str, body: &[u8]) -> Result<HeaderMap> {
        self.inner.headers(url, body)
    }
    fn render_payload(&self, request: &ChatRequest, stream: bool) -> Result<Value> {
        self.inner.render_payload(request, stream)
    }
    fn parse_response(&self, raw: &Value) -> Result<ProviderResponse> {
        self.inner.parse_response(raw)
    }
    fn parse_stream_event(&self, event: &Value) -> Result<Option<StreamChunk>> {
        self.inner.parse_stream_event(event)
    }
    fn classify_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> ColloquyError {
        match status {
            // Insufficient balance.
            402 => ColloquyError::Authentication(format!("deepseek: {}", body.trim())),
            _ => self.inner.classify_error(status, body, retry_after),
        }
    }
}
