//! HTTP exchange with per-attempt timeout and bounded retry.
//!
//! [`Transport`] never knows a provider's wire format: adapters build the
//! [`WireRequest`] and classify failures, the transport only moves bytes and
//! decides whether to try again.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{ColloquyError, Result};
use crate::provider::http::{build_client, parse_retry_after, SseDecoder};
use crate::provider::ProviderAdapter;
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;

/// A fully rendered provider request.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
}

/// A buffered provider response.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    /// Value of a `Retry-After` header, when present and numeric.
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl WireResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An opened streaming response whose body has not been read yet.
pub struct StreamResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: BoxStream<'static, Result<Vec<u8>>>,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("retry_after", &self.retry_after)
            .finish()
    }
}

/// Performs raw HTTP exchanges.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// POST the request and buffer the whole response.
    async fn send(&self, request: &WireRequest) -> Result<WireResponse>;

    /// POST the request and return once the status line is known.
    async fn open(&self, request: &WireRequest) -> Result<StreamResponse>;
}

/// Production backend over a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(30))?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn post(&self, request: &WireRequest) -> Result<reqwest::Response> {
        let body = serde_json::to_vec(&request.body)?;
        Ok(self
            .client
            .post(&request.url)
            .headers(request.headers.clone())
            .body(body)
            .send()
            .await?)
    }
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse> {
        let resp = self.post(request).await?;
        let status = resp.status().as_u16();
        let retry_after = retry_after_header(resp.headers());
        let body = resp.text().await?;
        Ok(WireResponse {
            status,
            retry_after,
            body,
        })
    }

    async fn open(&self, request: &WireRequest) -> Result<StreamResponse> {
        let resp = self.post(request).await?;
        let status = resp.status().as_u16();
        let retry_after = retry_after_header(resp.headers());
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ColloquyError::Network))
            .boxed();
        Ok(StreamResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Executes provider requests with timeout and retry.
#[derive(Clone)]
pub struct Transport {
    backend: Arc<dyn HttpBackend>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Transport {
    pub fn new(backend: Arc<dyn HttpBackend>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            backend,
            policy,
            timeout,
        }
    }

    /// Transport over [`ReqwestBackend`] using the config's retry and timeout.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::with_backend(config, Arc::new(ReqwestBackend::new()?)))
    }

    /// Transport over a custom backend using the config's retry and timeout.
    pub fn with_backend(config: &Config, backend: Arc<dyn HttpBackend>) -> Self {
        Self::new(backend, config.retry_policy(), config.request_timeout)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform a request and return the parsed JSON body.
    pub async fn execute(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &WireRequest,
    ) -> Result<Value> {
        debug!(provider = adapter.slug(), url = %request.url, "Sending request");

        let backend = self.backend.as_ref();
        let timeout = self.timeout;
        self.policy
            .execute(move || async move {
                with_timeout(timeout, async move {
                    let request = for_attempt(adapter, request)?;
                    let response = backend.send(&request).await?;
                    if !response.is_success() {
                        return Err(adapter.classify_error(
                            response.status,
                            &response.body,
                            response.retry_after,
                        ));
                    }
                    serde_json::from_str(&response.body).map_err(|e| {
                        ColloquyError::malformed(format!(
                            "{} returned a body that is not JSON: {e}",
                            adapter.slug()
                        ))
                    })
                })
                .await
            })
            .await
    }

    /// Open a server-sent-events stream and yield each event's JSON payload.
    ///
    /// Only establishment is retried. Once the body is flowing, errors are
    /// yielded to the consumer and end the stream.
    pub async fn stream(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &WireRequest,
    ) -> Result<BoxStream<'static, Result<Value>>> {
        debug!(provider = adapter.slug(), url = %request.url, "Opening stream");

        let backend = self.backend.as_ref();
        let timeout = self.timeout;
        let response = self
            .policy
            .execute(move || async move {
                with_timeout(timeout, async move {
                    let request = for_attempt(adapter, request)?;
                    let response = backend.open(&request).await?;
                    if !(200..300).contains(&response.status) {
                        let status = response.status;
                        let retry_after = response.retry_after;
                        let body = collect_body(response.body).await;
                        return Err(adapter.classify_error(status, &body, retry_after));
                    }
                    Ok(response)
                })
                .await
            })
            .await?;

        let mut body = response.body;
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            loop {
                let next = match tokio::time::timeout(timeout, body.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        yield Err(ColloquyError::Timeout(timeout.as_millis() as u64));
                        return;
                    }
                };
                match next {
                    Some(Ok(bytes)) => {
                        for data in decoder.push(&bytes) {
                            yield decode_event(&data);
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(e);
                        return;
                    }
                    None => break,
                }
            }
            for data in decoder.finish() {
                yield decode_event(&data);
            }
        };

        Ok(Box::pin(stream))
    }
}

/// The request as it goes out on one attempt, re-signed when the adapter asks.
fn for_attempt<'a>(adapter: &dyn ProviderAdapter, request: &'a WireRequest) -> Result<Cow<'a, WireRequest>> {
    Ok(match adapter.refresh_headers(request)? {
        Some(headers) => Cow::Owned(WireRequest {
            headers,
            ..request.clone()
        }),
        None => Cow::Borrowed(request),
    })
}

fn decode_event(data: &str) -> Result<Value> {
    serde_json::from_str(data)
        .map_err(|e| ColloquyError::malformed(format!("invalid stream event: {e}")))
}

async fn collect_body(mut body: BoxStream<'static, Result<Vec<u8>>>) -> String {
    let mut bytes = Vec::new();
    while let Some(Ok(chunk)) = body.next().await {
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
