//! Generation options and related enums.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Options controlling text generation.
///
/// ```
/// use colloquy::types::GenerationOptions;
///
/// let options = GenerationOptions::builder().temperature(0.2).max_tokens(256).build();
/// assert_eq!(options.max_tokens, Some(256));
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

impl FinishReason {
    /// Map a provider-specific stop reason onto the normalized set.
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw {
            "stop" | "end_turn" | "STOP" | "stop_sequence" => Some(Self::Stop),
            "length" | "max_tokens" | "MAX_TOKENS" => Some(Self::Length),
            "tool_calls" | "tool_use" | "function_call" => Some(Self::ToolCalls),
            "content_filter" | "SAFETY" | "RECITATION" => Some(Self::ContentFilter),
            _ => None,
        }
    }
}
