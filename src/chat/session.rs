//! The conversation engine: history, chainable configuration and the
//! ask/tool loop.

use std::ops::ControlFlow;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use super::callbacks::{CallbackDispatcher, CallbackResult, EventKind};
use super::conversation::Conversation;
use super::persistence::{Persistence, WriteQueue};
use super::state::SessionState;
use crate::error::{ColloquyError, Result};
use crate::models::{Model, ModelRegistry, Resolved};
use crate::provider::{ChatRequest, ProviderAdapter, ProviderResponse};
use crate::tools::{Tool, ToolInvoker, ToolSet};
use crate::transport::Transport;
use crate::types::{Cost, GenerationOptions, ImageContent, Message, StreamAccumulator, StreamChunk, Usage};

type ChunkHandler<'r, 'f> = &'r mut (dyn FnMut(&StreamChunk) -> ControlFlow<()> + Send + 'f);

/// A conversation with one model.
///
/// Configuration methods return `&mut Self` so they chain:
///
/// ```rust,no_run
/// # async fn demo(registry: std::sync::Arc<colloquy::models::ModelRegistry>) -> colloquy::error::Result<()> {
/// use colloquy::tools::Calculator;
///
/// let mut chat = registry.chat_with("gpt-4.1-nano")?;
/// chat.with_instructions("Answer with a number only")
///     .with_temperature(0.0)
///     .with_tool(Calculator::new())?;
/// let reply = chat.ask("What is 17 * 23?").await?;
/// println!("{}", reply.text());
/// # Ok(())
/// # }
/// ```
pub struct ChatSession {
    registry: Arc<ModelRegistry>,
    resolved: Resolved,
    conversation: Conversation,
    options: GenerationOptions,
    invoker: ToolInvoker,
    max_tool_turns: usize,
    parallel_tools: bool,
    callbacks: CallbackDispatcher,
    writes: WriteQueue,
    state: SessionState,
    /// History length and state to return to if the running turn is dropped.
    in_flight: Option<(usize, SessionState)>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("conversation_id", &self.conversation.id)
            .field("model", &self.resolved.model.id)
            .field("state", &self.state)
            .field("messages", &self.conversation.len())
            .field("tools", self.invoker.tools())
            .finish()
    }
}

impl ChatSession {
    pub fn new(registry: Arc<ModelRegistry>, model_id: &str) -> Result<Self> {
        let resolved = registry.resolve(model_id)?;
        let max_tool_turns = registry.config().max_tool_turns;
        Ok(Self {
            registry,
            resolved,
            conversation: Conversation::new(),
            options: GenerationOptions::default(),
            invoker: ToolInvoker::default(),
            max_tool_turns,
            parallel_tools: true,
            callbacks: CallbackDispatcher::new(),
            writes: WriteQueue::new(None),
            state: SessionState::Idle,
            in_flight: None,
        })
    }

    // Configuration

    /// Add a system message after any existing leading instructions.
    pub fn with_instructions(&mut self, text: impl Into<String>) -> &mut Self {
        let inserted = self.conversation.insert_system(Message::system(text));
        self.writes.enqueue_message(inserted);
        self
    }

    /// Replace all leading instructions with a single system message.
    pub fn with_instructions_replacing(&mut self, text: impl Into<String>) -> &mut Self {
        for removed in self.conversation.remove_leading_system() {
            self.writes.retract(removed.id);
        }
        self.with_instructions(text)
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn with_tool<T: Tool + 'static>(&mut self, tool: T) -> Result<&mut Self> {
        self.with_tools([Arc::new(tool) as Arc<dyn Tool>])
    }

    pub fn with_tools(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<&mut Self> {
        if !self.resolved.model.supports_tools() {
            return Err(ColloquyError::UnsupportedCapability(format!(
                "model '{}' does not support tool calling",
                self.resolved.model.id
            )));
        }
        for tool in tools {
            self.invoker.register(tool);
        }
        Ok(self)
    }

    /// Switch models, keeping history. The session returns to `Idle`.
    pub fn with_model(&mut self, model_id: &str) -> Result<&mut Self> {
        let resolved = self.registry.resolve(model_id)?;
        if !self.invoker.tools().is_empty() && !resolved.model.supports_tools() {
            return Err(ColloquyError::UnsupportedCapability(format!(
                "model '{}' does not support tool calling and {} tools are registered",
                resolved.model.id,
                self.invoker.tools().len()
            )));
        }
        info!(
            from = %self.resolved.model.id,
            to = %resolved.model.id,
            conversation_id = %self.conversation.id,
            "Switching model"
        );
        self.resolved = resolved;
        self.state = SessionState::Idle;
        Ok(self)
    }

    pub fn with_temperature(&mut self, temperature: f64) -> &mut Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(&mut self, max_tokens: u32) -> &mut Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_options(&mut self, options: GenerationOptions) -> &mut Self {
        self.options = options;
        self
    }

    pub fn with_max_tool_turns(&mut self, turns: usize) -> &mut Self {
        self.max_tool_turns = turns;
        self
    }

    /// Run a response's tool calls concurrently (default) or one by one.
    pub fn with_parallel_tools(&mut self, parallel: bool) -> &mut Self {
        self.parallel_tools = parallel;
        self
    }

    /// Attach a store. Existing history is queued for it and written on
    /// the next flush.
    pub fn with_persistence(&mut self, store: Arc<dyn Persistence>) -> &mut Self {
        self.writes = WriteQueue::new(Some(store));
        for message in self.conversation.messages() {
            self.writes.enqueue_message(message);
        }
        self
    }

    pub fn on_new_message<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&Message) -> CallbackResult + Send + 'static,
    {
        self.callbacks.register(EventKind::NewMessage, hook);
        self
    }

    pub fn on_end_message<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&Message) -> CallbackResult + Send + 'static,
    {
        self.callbacks.register(EventKind::EndMessage, hook);
        self
    }

    // Observers

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn model(&self) -> &Model {
        &self.resolved.model
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn tools(&self) -> &ToolSet {
        self.invoker.tools()
    }

    pub fn total_usage(&self) -> Usage {
        self.conversation.total_usage()
    }

    /// Estimated spend so far, when the model has pricing.
    pub fn total_cost(&self) -> Option<Cost> {
        self.resolved.model.capabilities.cost(&self.total_usage())
    }

    // Asking

    /// Send a user message and run the tool loop to a final answer.
    pub async fn ask(&mut self, text: impl Into<String>) -> Result<Message> {
        self.run(Message::user(text), None).await
    }

    /// As [`ask`](Self::ask), with images attached to the user message.
    pub async fn ask_with_images(
        &mut self,
        text: impl Into<String>,
        images: Vec<ImageContent>,
    ) -> Result<Message> {
        self.run(Message::user_with_images(text, images), None).await
    }

    /// As [`ask`](Self::ask), delivering chunks as they arrive.
    ///
    /// Returning `ControlFlow::Break` from `on_chunk` abandons the turn:
    /// history and state go back to where they were and `Cancelled` is
    /// returned.
    pub async fn ask_streaming<F>(&mut self, text: impl Into<String>, mut on_chunk: F) -> Result<Message>
    where
        F: FnMut(&StreamChunk) -> ControlFlow<()> + Send,
    {
        let handler: ChunkHandler<'_, '_> = &mut on_chunk;
        self.run(Message::user(text), Some(handler)).await
    }

    async fn run(&mut self, user: Message, on_chunk: Option<ChunkHandler<'_, '_>>) -> Result<Message> {
        if let Some((len, state)) = self.in_flight.take() {
            warn!(
                conversation_id = %self.conversation.id,
                state = %self.state,
                "Previous turn was dropped mid-flight; reverting it"
            );
            self.rewind(len, state).await;
        }
        if !self.state.accepts_input() {
            return Err(ColloquyError::InvalidState(format!(
                "cannot ask while the session is {}",
                self.state
            )));
        }
        if user.has_images() && !self.resolved.model.supports_vision() {
            return Err(ColloquyError::UnsupportedCapability(format!(
                "model '{}' does not accept images",
                self.resolved.model.id
            )));
        }

        let checkpoint = self.conversation.len();
        let prior_state = self.state;
        debug!(
            conversation_id = %self.conversation.id,
            model = %self.resolved.model.id,
            streaming = on_chunk.is_some(),
            "Starting turn"
        );

        self.in_flight = Some((checkpoint, prior_state));
        let result = self.turn(user, on_chunk).await;
        self.in_flight = None;

        match result {
            Ok(message) => Ok(message),
            Err(ColloquyError::Cancelled) => {
                self.rewind(checkpoint, prior_state).await;
                Err(ColloquyError::Cancelled)
            }
            Err(e) => {
                warn!(conversation_id = %self.conversation.id, error = %e, "Turn failed");
                self.answer_unresolved(&e);
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Give every tool call left without a result an error result, so the
    /// next request never carries an unanswered call. The results are
    /// queued for persistence and flushed by the next `ask`.
    fn answer_unresolved(&mut self, cause: &ColloquyError) {
        let ids: Vec<String> = self
            .conversation
            .unresolved_tool_calls()
            .into_iter()
            .map(|call| call.id.clone())
            .collect();
        if ids.is_empty() {
            return;
        }
        debug!(count = ids.len(), "Answering tool calls abandoned by a failed turn");
        let content = serde_json::json!({ "error": format!("turn aborted: {cause}") }).to_string();
        for id in ids {
            let appended = self.conversation.push(Message::tool_result(id, content.clone()));
            self.writes.enqueue_message(appended);
        }
    }

    async fn turn(&mut self, user: Message, mut on_chunk: Option<ChunkHandler<'_, '_>>) -> Result<Message> {
        self.writes.flush(self.conversation.id).await?;
        self.append(user).await?;

        let registry = self.registry.clone();
        let mut rounds = 0;
        loop {
            self.state = SessionState::AwaitingResponse;
            let adapter = self.resolved.adapter.clone();
            let request = ChatRequest {
                model: self.resolved.model.clone(),
                messages: self.conversation.messages().to_vec(),
                tools: self.invoker.tools().schemas(),
                options: self.options.clone(),
            };
            let response = fetch(
                registry.transport(),
                adapter.as_ref(),
                &request,
                on_chunk.as_deref_mut(),
            )
            .await?;

            let model_id = self.resolved.model.id.clone();
            if response.tool_calls.is_empty() {
                let message = Message::from_response(response.content, Vec::new(), response.usage, model_id);
                self.append(message).await?;
                let last = self
                    .conversation
                    .last()
                    .cloned()
                    .ok_or_else(|| ColloquyError::InvalidState("transcript is empty".into()))?;
                self.callbacks.dispatch(EventKind::EndMessage, &last)?;
                self.state = SessionState::Done;
                debug!(conversation_id = %self.conversation.id, rounds, "Turn complete");
                return Ok(last);
            }

            if rounds >= self.max_tool_turns {
                return Err(ColloquyError::ToolLoopExceeded {
                    limit: self.max_tool_turns,
                });
            }
            rounds += 1;

            let calls = response.tool_calls.clone();
            let message = Message::from_response(response.content, response.tool_calls, response.usage, model_id);
            self.append(message).await?;

            self.state = SessionState::ExecutingTools;
            debug!(count = calls.len(), round = rounds, parallel = self.parallel_tools, "Running tool calls");
            let outcomes = self
                .invoker
                .invoke_all(&calls, self.conversation.id, self.parallel_tools)
                .await;
            for outcome in outcomes {
                self.append(Message::tool_result(outcome.tool_call_id, outcome.content))
                    .await?;
            }
        }
    }

    /// Append, persist, then announce a message.
    async fn append(&mut self, message: Message) -> Result<()> {
        let appended = self.conversation.push(message);
        self.writes.enqueue_message(appended);
        self.writes.flush(self.conversation.id).await?;
        if let Some(last) = self.conversation.last() {
            self.callbacks.dispatch(EventKind::NewMessage, last)?;
        }
        Ok(())
    }

    async fn rewind(&mut self, len: usize, state: SessionState) {
        let removed = self.conversation.truncate(len);
        debug!(
            conversation_id = %self.conversation.id,
            removed = removed.len(),
            "Turn cancelled"
        );
        for message in &removed {
            self.writes.retract(message.id);
        }
        self.state = state;
        if let Err(e) = self.writes.flush(self.conversation.id).await {
            warn!(error = %e, "Could not persist cancellation; will retry on next ask");
        }
    }
}

/// One provider round trip, buffered or streamed.
async fn fetch(
    transport: &Transport,
    adapter: &dyn ProviderAdapter,
    request: &ChatRequest,
    on_chunk: Option<ChunkHandler<'_, '_>>,
) -> Result<ProviderResponse> {
    let Some(on_chunk) = on_chunk else {
        let wire = adapter.build_request(request, false)?;
        let raw = transport.execute(adapter, &wire).await?;
        return adapter.parse_response(&raw);
    };

    let wire = adapter.build_request(request, true)?;
    let mut events = transport.stream(adapter, &wire).await?;
    let mut accumulator = StreamAccumulator::new();
    while let Some(event) = events.next().await {
        let Some(chunk) = adapter.parse_stream_event(&event?)? else {
            continue;
        };
        if chunk.is_empty() {
            continue;
        }
        accumulator.push(&chunk);
        if on_chunk(&chunk).is_break() {
            return Err(ColloquyError::Cancelled);
        }
    }

    let finish_reason = accumulator.finish_reason();
    let (content, tool_calls, usage) = accumulator.finish();
    Ok(ProviderResponse {
        content,
        tool_calls,
        usage,
        finish_reason,
    })
}
