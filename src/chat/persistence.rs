//! Storage hooks for conversation records.
//!
//! The crate ships no store. A session queues a write for every appended
//! message and drains the queue in order; a write that fails stays at the
//! head of the queue and is retried on the next flush.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ColloquyError, Result};
use crate::types::{Message, ToolCall};

/// External store for messages and tool calls.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn persist(&self, conversation_id: Uuid, message: &Message) -> Result<()>;

    async fn persist_tool_call(&self, message_id: Uuid, tool_call: &ToolCall) -> Result<()>;

    /// Forget a message that left the transcript.
    async fn remove(&self, _conversation_id: Uuid, _message_id: Uuid) -> Result<()> {
        Ok(())
    }
}

/// A write waiting to reach the store.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    Message(Message),
    ToolCall { message_id: Uuid, tool_call: ToolCall },
    Removal { message_id: Uuid },
}

impl PendingWrite {
    fn message_id(&self) -> Uuid {
        match self {
            Self::Message(message) => message.id,
            Self::ToolCall { message_id, .. } | Self::Removal { message_id } => *message_id,
        }
    }
}

/// Ordered queue of writes for one conversation.
#[derive(Default)]
pub struct WriteQueue {
    store: Option<Arc<dyn Persistence>>,
    pending: VecDeque<PendingWrite>,
}

impl WriteQueue {
    pub fn new(store: Option<Arc<dyn Persistence>>) -> Self {
        Self {
            store,
            pending: VecDeque::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingWrite> {
        self.pending.iter()
    }

    /// Queue a message and each tool call it carries.
    pub fn enqueue_message(&mut self, message: &Message) {
        if !self.is_enabled() {
            return;
        }
        self.pending.push_back(PendingWrite::Message(message.clone()));
        for call in &message.tool_calls {
            self.pending.push_back(PendingWrite::ToolCall {
                message_id: message.id,
                tool_call: call.clone(),
            });
        }
    }

    /// Take back a message: drop its unsent writes, or queue a removal if it
    /// already reached the store.
    pub fn retract(&mut self, message_id: Uuid) {
        if !self.is_enabled() {
            return;
        }
        let queued = self
            .pending
            .iter()
            .any(|w| matches!(w, PendingWrite::Message(m) if m.id == message_id));
        if queued {
            self.pending.retain(|w| w.message_id() != message_id);
        } else {
            self.pending.push_back(PendingWrite::Removal { message_id });
        }
    }

    /// Send queued writes in order, stopping at the first failure.
    pub async fn flush(&mut self, conversation_id: Uuid) -> Result<()> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        while let Some(write) = self.pending.front() {
            let result = match write {
                PendingWrite::Message(message) => store.persist(conversation_id, message).await,
                PendingWrite::ToolCall { message_id, tool_call } => {
                    store.persist_tool_call(*message_id, tool_call).await
                }
                PendingWrite::Removal { message_id } => store.remove(conversation_id, *message_id).await,
            };
            result.map_err(|e| match e {
                e @ ColloquyError::Persistence(_) => e,
                other => ColloquyError::Persistence(other.to_string()),
            })?;
            debug!(message_id = %write.message_id(), "Persisted write");
            self.pending.pop_front();
        }
        Ok(())
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("enabled", &self.is_enabled())
            .field("pending", &self.pending.len())
            .finish()
    }
}
