//! Shared test helpers: a scripted HTTP backend, response builders and a
//! recording store.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use uuid::Uuid;

use colloquy::chat::Persistence;
use colloquy::config::Config;
use colloquy::error::{ColloquyError, Result};
use colloquy::models::{ModelRegistry, ProviderKey};
use colloquy::transport::{HttpBackend, StreamResponse, WireRequest, WireResponse};
use colloquy::types::{Message, ToolCall};

/// One scripted exchange.
pub enum Reply {
    Json(Value),
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },
    /// Server-sent events, each string being one event's data.
    Events(Vec<String>),
    Fail(fn() -> ColloquyError),
    /// Never answers; for timeout tests.
    Hang,
}

impl Reply {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
            retry_after: None,
        }
    }
}

/// Backend that replays scripted replies in order and records requests.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<WireRequest>>,
    attempts: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_body(&self) -> Value {
        self.requests().last().expect("no request sent").body.clone()
    }

    fn next(&self, request: &WireRequest) -> Reply {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("backend ran out of scripted replies")
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse> {
        match self.next(request) {
            Reply::Json(body) => Ok(WireResponse {
                status: 200,
                retry_after: None,
                body: body.to_string(),
            }),
            Reply::Status {
                status,
                body,
                retry_after,
            } => Ok(WireResponse {
                status,
                retry_after,
                body,
            }),
            Reply::Events(_) => panic!("streamed reply scripted for a buffered request"),
            Reply::Fail(make) => Err(make()),
            Reply::Hang => futures::future::pending().await,
        }
    }

    async fn open(&self, request: &WireRequest) -> Result<StreamResponse> {
        match self.next(request) {
            Reply::Events(events) => {
                let chunks: Vec<Result<Vec<u8>>> = events
                    .into_iter()
                    .map(|data| Ok(format!("data: {data}\n\n").into_bytes()))
                    .chain(std::iter::once(Ok(b"data: [DONE]\n\n".to_vec())))
                    .collect();
                Ok(StreamResponse {
                    status: 200,
                    retry_after: None,
                    body: futures::stream::iter(chunks).boxed(),
                })
            }
            Reply::Status {
                status,
                body,
                retry_after,
            } => Ok(StreamResponse {
                status,
                retry_after,
                body: futures::stream::once(async move { Ok(body.into_bytes()) }).boxed(),
            }),
            Reply::Json(_) => panic!("buffered reply scripted for a streamed request"),
            Reply::Fail(make) => Err(make()),
            Reply::Hang => futures::future::pending().await,
        }
    }
}

// OpenAI-format builders

pub fn openai_text(content: &str, input_tokens: u32, output_tokens: u32) -> Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": input_tokens,
            "completion_tokens": output_tokens,
            "total_tokens": input_tokens + output_tokens,
        },
    })
}

pub fn openai_tool_calls(calls: &[(&str, &str, Value)]) -> Value {
    let calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, args)| {
            json!({
                "id": id,
                "type": "function",
                "function": { "name": name, "arguments": args.to_string() },
            })
        })
        .collect();
    json!({
        "id": "chatcmpl-2",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": null, "tool_calls": calls },
            "finish_reason": "tool_calls",
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 },
    })
}

pub fn openai_text_deltas(parts: &[&str]) -> Vec<String> {
    let mut events: Vec<String> = parts
        .iter()
        .map(|p| json!({ "choices": [{ "index": 0, "delta": { "content": p } }] }).to_string())
        .collect();
    events.push(json!({ "choices": [{ "index": 0, "delta": {}, "finish_reason": "stop" }] }).to_string());
    events.push(
        json!({ "choices": [], "usage": { "prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10 } })
            .to_string(),
    );
    events
}

// Config and registry

/// Credentials for every provider and fast, jitter-free retries.
pub fn test_config() -> Config {
    Config::default()
        .with_api_key(ProviderKey::OpenAi, "sk-test")
        .with_api_key(ProviderKey::Anthropic, "ant-test")
        .with_api_key(ProviderKey::Gemini, "gem-test")
        .with_api_key(ProviderKey::DeepSeek, "ds-test")
        .with_bedrock("AKIDEXAMPLE", "secret", "us-east-1")
        .with_retry_interval(Duration::from_millis(1))
        .with_retry_interval_randomness(0.0)
        .with_max_retries(2)
}

pub fn registry(backend: Arc<ScriptedBackend>) -> Arc<ModelRegistry> {
    registry_with(test_config(), backend)
}

pub fn registry_with(config: Config, backend: Arc<ScriptedBackend>) -> Arc<ModelRegistry> {
    Arc::new(ModelRegistry::with_backend(config, backend).unwrap())
}

// Persistence

/// Store that logs every write and can be told to fail.
#[derive(Default)]
pub struct RecordingStore {
    pub log: Mutex<Vec<String>>,
    pub failing: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ColloquyError::Persistence("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for RecordingStore {
    async fn persist(&self, _conversation_id: Uuid, message: &Message) -> Result<()> {
        self.check()?;
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", message.role, message.text()));
        Ok(())
    }

    async fn persist_tool_call(&self, _message_id: Uuid, tool_call: &ToolCall) -> Result<()> {
        self.check()?;
        self.log.lock().unwrap().push(format!("call:{}", tool_call.id));
        Ok(())
    }

    async fn remove(&self, _conversation_id: Uuid, _message_id: Uuid) -> Result<()> {
        self.check()?;
        self.log.lock().unwrap().push("remove".into());
        Ok(())
    }
}
