//! Shared HTTP client, SSE parsing, and auth utilities.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::error::{ColloquyError, ErrorDetails, Result};

/// Build the reqwest client used by the production backend.
///
/// No total timeout is set here: each attempt is bounded by the transport so
/// that long streams are not cut off by the client.
pub fn build_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| ColloquyError::Configuration(format!("failed to build HTTP client: {e}")))
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ColloquyError::Configuration(format!("invalid characters in {name} header")))
}

/// Insert an arbitrary header, validating name and value.
pub fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ColloquyError::Configuration(format!("invalid header name {name}")))?;
    headers.insert(header_name, header_value(name, value)?);
    Ok(())
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = json_headers();
    headers.insert(
        AUTHORIZATION,
        header_value("authorization", &format!("Bearer {api_key}"))?,
    );
    Ok(headers)
}

/// Build Anthropic-style headers (x-api-key).
pub fn anthropic_headers(api_key: &str, version: &str) -> Result<HeaderMap> {
    let mut headers = json_headers();
    insert_header(&mut headers, "x-api-key", api_key)?;
    insert_header(&mut headers, "anthropic-version", version)?;
    Ok(headers)
}

/// Build Gemini headers (x-goog-api-key).
pub fn google_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = json_headers();
    insert_header(&mut headers, "x-goog-api-key", api_key)?;
    Ok(headers)
}

/// Parse an SSE "data:" line, returning None for "[DONE]" and non-data lines.
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Incremental server-sent-events decoder.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence.
/// Complete events are returned as their joined `data:` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning the payloads of every event they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            self.process_line(line, &mut events);
        }

        events
    }

    /// Flush an event left open when the stream ends without a blank line.
    pub fn finish(mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end().to_string();
            self.process_line(&line, &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if line.starts_with("data:") {
            if let Some(data) = parse_sse_data(line) {
                self.data.push(data.to_string());
            }
        }
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if !self.data.is_empty() {
            events.push(self.data.join("\n"));
            self.data.clear();
        }
    }
}

/// Parse a `Retry-After` header given in seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Classify a non-success HTTP status into an error.
pub fn status_to_error(status: u16, body: &str, retry_after: Option<Duration>) -> ColloquyError {
    let (message, details) = extract_error(body);
    match status {
        401 | 403 => ColloquyError::Authentication(message),
        429 => ColloquyError::RateLimited {
            retry_after_ms: retry_after
                .or_else(|| extract_retry_after(body))
                .map(|d| d.as_millis() as u64),
        },
        500..=599 => ColloquyError::Transport {
            status: Some(status),
            message,
        },
        _ => ColloquyError::Api {
            status,
            message,
            details: (!details.is_empty()).then_some(details),
        },
    }
}

/// Pull a human-readable message and structured details out of an error body.
///
/// Handles the OpenAI/DeepSeek, Anthropic and Gemini envelopes; anything else
/// is returned verbatim.
fn extract_error(body: &str) -> (String, ErrorDetails) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return (body.trim().to_string(), ErrorDetails::default());
    };
    let error = value.get("error").unwrap_or(&value);
    if let Some(text) = error.as_str() {
        return (text.to_string(), ErrorDetails::default());
    }

    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string());
    let string_field = |key: &str| {
        error.get(key).and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };
    let details = ErrorDetails {
        error_type: string_field("type").or_else(|| string_field("status")),
        provider_code: string_field("code"),
        request_id: value
            .get("request_id")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    };
    (message, details)
}

fn extract_retry_after(body: &str) -> Option<Duration> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(Duration::from_secs_f64)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_split_events_and_comments() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b": keep-alive\n\ndata: {\"a\"").is_empty());
        let events = decoder.push(b":1}\n\ndata: [DONE]\n\n");

        assert_eq!(events, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn decoder_ignores_event_lines_and_crlf() {
        let mut decoder = SseDecoder::new();
        let events =
            decoder.push(b"event: message_start\r\ndata: {\"x\":true}\r\n\r\ndata:{\"y\":1}\n\n");

        assert_eq!(events, vec!["{\"x\":true}", "{\"y\":1}"]);
    }

    #[test]
    fn decoder_keeps_multibyte_characters_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: {\"t\":\"é\"}\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b >= 0x80).unwrap() + 1;

        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["{\"t\":\"é\"}"]);
    }

    #[test]
    fn decoder_flushes_trailing_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"z\":0}").is_empty());
        assert_eq!(decoder.finish(), vec!["{\"z\":0}"]);
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            status_to_error(401, r#"{"error":{"message":"bad key"}}"#, None),
            ColloquyError::Authentication(m) if m == "bad key"
        ));
        assert!(matches!(
            status_to_error(429, "{}", Some(Duration::from_secs(2))),
            ColloquyError::RateLimited { retry_after_ms: Some(2000) }
        ));
        assert!(matches!(
            status_to_error(503, "busy", None),
            ColloquyError::Transport { status: Some(503), .. }
        ));
    }

    #[test]
    fn api_error_keeps_provider_details() {
        let body = r#"{"error":{"message":"too long","type":"invalid_request_error","code":"context_length_exceeded"}}"#;
        match status_to_error(400, body, None) {
            ColloquyError::Api { message, details, .. } => {
                assert_eq!(message, "too long");
                let details = details.unwrap();
                assert_eq!(details.error_type.as_deref(), Some("invalid_request_error"));
                assert_eq!(details.provider_code.as_deref(), Some("context_length_exceeded"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gemini_status_becomes_error_type() {
        let body = r#"{"error":{"code":400,"message":"bad","status":"INVALID_ARGUMENT"}}"#;
        match status_to_error(400, body, None) {
            ColloquyError::Api { details: Some(d), .. } => {
                assert_eq!(d.error_type.as_deref(), Some("INVALID_ARGUMENT"));
                assert_eq!(d.provider_code.as_deref(), Some("400"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn retry_after_parses_seconds() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("0.5"), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
