//! Convenience re-exports for common use.

pub use crate::chat::{ChatSession, Conversation, EventKind, Persistence, SessionState};
pub use crate::config::Config;
pub use crate::error::{ColloquyError, Result};
pub use crate::models::{Model, ModelCapabilities, ModelRegistry, ProviderKey};
pub use crate::tools::{Calculator, FnTool, Tool, ToolArguments, ToolContext, ToolParameters};
pub use crate::types::{
    ContentPart, FinishReason, GenerationOptions, ImageContent, Message, Role, StreamChunk, ToolCall, Usage,
};
