//! Lifecycle hooks fired by a session.

use std::collections::HashMap;

use strum::Display;

use crate::error::{ColloquyError, Result};
use crate::types::Message;

/// What a hook returns; any error aborts the turn.
pub type CallbackResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Hook = Box<dyn FnMut(&Message) -> CallbackResult + Send>;

/// Session lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    /// A user, assistant or tool message was appended.
    NewMessage,
    /// A turn finished with a final assistant message.
    EndMessage,
}

/// Ordered hooks per event.
#[derive(Default)]
pub struct CallbackDispatcher {
    hooks: HashMap<EventKind, Vec<Hook>>,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, event: EventKind, hook: F)
    where
        F: FnMut(&Message) -> CallbackResult + Send + 'static,
    {
        self.hooks.entry(event).or_default().push(Box::new(hook));
    }

    pub fn len(&self, event: EventKind) -> usize {
        self.hooks.get(&event).map_or(0, Vec::len)
    }

    /// Run every hook for `event` in registration order, stopping at the
    /// first failure.
    pub fn dispatch(&mut self, event: EventKind, message: &Message) -> Result<()> {
        let Some(hooks) = self.hooks.get_mut(&event) else {
            return Ok(());
        };
        for hook in hooks.iter_mut() {
            hook(message).map_err(|e| ColloquyError::Callback {
                event: event.to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("new_message", &self.len(EventKind::NewMessage))
            .field("end_message", &self.len(EventKind::EndMessage))
            .finish()
    }
}
