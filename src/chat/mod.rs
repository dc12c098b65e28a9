//! Conversation sessions.
//!
//! A [`ChatSession`] owns one [`Conversation`] and drives it through the
//! [`SessionState`] machine: each `ask` appends a user message, requests a
//! response, runs any tool calls the model makes and repeats until the model
//! answers without tools.

pub mod callbacks;
pub mod conversation;
pub mod persistence;
pub mod session;
pub mod state;

pub use callbacks::{CallbackDispatcher, CallbackResult, EventKind};
pub use conversation::Conversation;
pub use persistence::{PendingWrite, Persistence, WriteQueue};
pub use session::ChatSession;
pub use state::SessionState;
