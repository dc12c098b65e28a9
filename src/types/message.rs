//! Normalized message model shared by every provider adapter.

use std::path::Path;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::usage::Usage;
use crate::error::{ColloquyError, Result};

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// Tool calls emitted by an assistant message, in emission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call a tool-role message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            model_id: None,
            input_tokens: None,
            output_tokens: None,
            created_at: Utc::now(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::text(text)])
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    /// Create a user message with image attachments after the text.
    pub fn user_with_images(text: impl Into<String>, images: Vec<ImageContent>) -> Self {
        let mut content = vec![ContentPart::text(text)];
        content.extend(images.into_iter().map(ContentPart::Image));
        Self::new(Role::User, content)
    }

    /// Create an assistant message with plain text.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::text(text)])
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Tool, vec![ContentPart::text(content)]);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// Build the assistant message for a parsed provider response.
    ///
    /// Token counts are fixed here and nowhere else.
    pub fn from_response(
        content: String,
        tool_calls: Vec<ToolCall>,
        usage: Option<Usage>,
        model_id: impl Into<String>,
    ) -> Self {
        let parts = if content.is_empty() {
            Vec::new()
        } else {
            vec![ContentPart::text(content)]
        };
        let mut message = Self::new(Role::Assistant, parts);
        message.tool_calls = tool_calls;
        message.model_id = Some(model_id.into());
        message.input_tokens = usage.as_ref().map(|u| u.input_tokens);
        message.output_tokens = usage.as_ref().map(|u| u.output_tokens);
        message
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageContent> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::Image(img) => Some(img),
            _ => None,
        })
    }

    pub fn has_images(&self) -> bool {
        self.images().next().is_some()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Token usage, when this message came from a provider.
    pub fn usage(&self) -> Option<Usage> {
        match (self.input_tokens, self.output_tokens) {
            (None, None) => None,
            (input, output) => Some(Usage::new(input.unwrap_or(0), output.unwrap_or(0))),
        }
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image(ImageContent),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Base64 image content embedded in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    pub data: String,
    pub mime_type: String,
}

impl ImageContent {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Read an image file, inferring the MIME type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime_type = mime_type_for(path).ok_or_else(|| {
            ColloquyError::UnsupportedCapability(format!(
                "cannot infer image type of {}",
                path.display()
            ))
        })?;
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ColloquyError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Ok(Self::from_bytes(&bytes, mime_type))
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Argument mapping; a JSON object unless the provider sent garbage.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Parse a JSON-encoded argument string the way OpenAI-style APIs send it.
    ///
    /// Empty strings become `{}`; unparseable strings are kept verbatim so the
    /// tool invoker can report them back to the model.
    pub fn parse_arguments(raw: &str) -> serde_json::Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return serde_json::json!({});
        }
        serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
    }
}
