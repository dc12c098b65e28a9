//! AWS Bedrock adapter for Anthropic models.
//!
//! Payloads and responses are Anthropic's; the endpoint, version field and
//! authentication (SigV4) are Bedrock's.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::error::{ColloquyError, Result};
use crate::models::Model;
use crate::transport::WireRequest;
use crate::types::StreamChunk;

use super::anthropic::AnthropicAdapter;
use super::http::insert_header;
use super::sigv4::{sign_request, Credentials, SigningParams};
use super::{ChatRequest, ProviderAdapter, ProviderResponse};

pub const BEDROCK_VERSION: &str = "bedrock-2023-05-31";
const SERVICE: &str = "bedrock";

#[derive(Debug, Clone)]
pub struct BedrockAdapter {
    inner: AnthropicAdapter,
    credentials: Credentials,
    region: String,
    base_url: String,
}

impl BedrockAdapter {
    pub fn new(credentials: Credentials, region: impl Into<String>, base_url: Option<String>) -> Self {
        let region = region.into();
        let base_url = base_url
            .unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com"))
            .trim_end_matches('/')
            .to_string();
        Self {
            // Only payload and response mapping is borrowed; the key is unused.
            inner: AnthropicAdapter::new(String::new(), None),
            credentials,
            region,
            base_url,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Signed headers for a request made at `time`.
    pub fn signed_headers(&self, url: &str, body: &[u8], time: DateTime<Utc>) -> Result<HeaderMap> {
        let params = SigningParams {
            credentials: &self.credentials,
            region: &self.region,
            service: SERVICE,
            time,
        };
        let signed = sign_request(url, &[("content-type", "application/json")], body, &params)?;

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "accept", "application/json")?;
        for (name, value) in &signed {
            insert_header(&mut headers, name, value)?;
        }
        Ok(headers)
    }
}

impl ProviderAdapter for BedrockAdapter {
    fn slug(&self) -> &str {
        "bedrock"
    }

    fn completion_url(&self, model: &Model, _stream: bool) -> String {
        let encoded = model.id.replace(':', "%3A");
        format!("{}/model/{encoded}/invoke", self.base_url)
    }

    fn headers(&self, url: &str, body: &[u8]) -> Result<HeaderMap> {
        self.signed_headers(url, body, Utc::now())
    }

    fn refresh_headers(&self, request: &WireRequest) -> Result<Option<HeaderMap>> {
        let body = serde_json::to_vec(&request.body)?;
        self.headers(&request.url, &body).map(Some)
    }

    fn render_payload(&self, request: &ChatRequest, _stream: bool) -> Result<Value> {
        let mut body = self.inner.render_messages(request);
        let obj = body
            .as_object_mut()
            .ok_or_else(|| ColloquyError::InvalidState("payload is not an object".into()))?;
        obj.insert("anthropic_version".into(), BEDROCK_VERSION.into());
        Ok(body)
    }

    fn parse_response(&self, raw: &Value) -> Result<ProviderResponse> {
        self.inner.parse_message(self.slug(), raw)
    }

    fn parse_stream_event(&self, _event: &Value) -> Result<Option<StreamChunk>> {
        Err(ColloquyError::UnsupportedCapability(
            "bedrock adapter does not stream".into(),
        ))
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::builtin_models;
    use crate::types::Message;
    use chrono::TimeZone;

    fn adapter() -> BedrockAdapter {
        BedrockAdapter::new(
            Credentials {
                access_key_id: "AKIDEXAMPLE".into(),
                secret_access_key: "secret".into(),
                session_token: None,
            },
            "us-east-1",
            None,
        )
    }

    fn haiku() -> Model {
        builtin_models()
            .into_iter()
            .find(|m| m.id == "anthropic.claude-3-5-haiku-20241022-v1:0")
            .unwrap()
    }

    #[test]
    fn invoke_url_encodes_model_id() {
        assert_eq!(
            adapter().completion_url(&haiku(), false),
            "https://bedrock-runtime.us-east-1.amazonaws.com/model/anthropic.claude-3-5-haiku-20241022-v1%3A0/invoke"
        );
    }

    #[test]
    fn payload_is_anthropic_with_bedrock_version() {
        let request = ChatRequest::new(haiku(), vec![Message::system("sys"), Message::user("hi")]);

        let body = adapter().render_payload(&request, false).unwrap();

        assert_eq!(body["anthropic_version"], BEDROCK_VERSION);
        assert_eq!(body["system"], "sys");
        assert!(body.get("model").is_none());
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn streaming_is_rejected_before_any_request() {
        let request = ChatRequest::new(haiku(), vec![Message::user("hi")]);

        let err = adapter().build_request(&request, true).unwrap_err();

        assert!(matches!(err, ColloquyError::UnsupportedCapability(_)));
    }

    #[test]
    fn headers_are_sigv4_signed() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let headers = adapter()
            .signed_headers("https://bedrock-runtime.us-east-1.amazonaws.com/model/x/invoke", b"{}", time)
            .unwrap();

        let auth = headers["authorization"].to_str().unwrap();
        assert!(auth.contains("/20240501/us-east-1/bedrock/aws4_request"));
        assert_eq!(headers["x-amz-date"], "20240501T120000Z");
        assert_eq!(headers["content-type"], "application/json");
    }

    #[test]
    fn every_attempt_is_signed_again() {
        let request = ChatRequest::new(haiku(), vec![Message::user("hi")]);
        let a = adapter();
        let wire = a.build_request(&request, false).unwrap();

        let headers = a.refresh_headers(&wire).unwrap().unwrap();

        assert!(headers["authorization"].to_str().unwrap().starts_with("AWS4-HMAC-SHA256"));
        assert!(headers.contains_key("x-amz-date"));
    }
}
