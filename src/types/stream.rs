//! Streaming types.

use serde::{Deserialize, Serialize};

use super::generation::FinishReason;
use super::message::ToolCall;
use super::usage::Usage;

/// A normalized delta emitted during streaming.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamChunk {
    /// Incremental text.
    #[serde(default)]
    pub content: String,
    /// Tool-call fragments, keyed by their position in the response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.tool_calls.is_empty()
            && self.usage.is_none()
            && self.finish_reason.is_none()
    }
}

/// A fragment of a tool call being streamed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Partial JSON of the argument object.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    index: usize,
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Folds stream chunks into the final content, tool calls and usage.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    tool_calls: Vec<PartialToolCall>,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &StreamChunk) {
        self.content.push_str(&chunk.content);
        for delta in &chunk.tool_calls {
            let entry = self.slot_for(delta);
            if let Some(id) = &delta.id {
                entry.id = Some(id.clone());
            }
            if let Some(name) = &delta.name {
                entry.name = Some(name.clone());
            }
            entry.arguments.push_str(&delta.arguments);
        }
        if let Some(usage) = chunk.usage {
            // Providers report cumulative counts; keep the largest seen.
            let current = self.usage.get_or_insert_with(Usage::default);
            current.input_tokens = current.input_tokens.max(usage.input_tokens);
            current.output_tokens = current.output_tokens.max(usage.output_tokens);
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
    }

    // A delta carrying a new id at an index already in use starts a new call.
    fn slot_for(&mut self, delta: &ToolCallDelta) -> &mut PartialToolCall {
        let existing = self.tool_calls.iter().rposition(|call| {
            call.index == delta.index
                && match (&call.id, &delta.id) {
                    (Some(current), Some(incoming)) => current == incoming,
                    _ => true,
                }
        });
        let position = match existing {
            Some(position) => position,
            None => {
                self.tool_calls.push(PartialToolCall {
                    index: delta.index,
                    ..PartialToolCall::default()
                });
                self.tool_calls.len() - 1
            }
        };
        &mut self.tool_calls[position]
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Finish accumulation. Tool calls come out in the order they were first
    /// seen; calls that never received an id get a generated one.
    pub fn finish(self) -> (String, Vec<ToolCall>, Option<Usage>) {
        let calls = self
            .tool_calls
            .into_iter()
            .filter_map(|partial| {
                let name = partial.name?;
                let id = partial
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                Some(ToolCall::new(
                    id,
                    name,
                    ToolCall::parse_arguments(&partial.arguments),
                ))
            })
            .collect();
        (self.content, calls, self.usage)
    }
}
