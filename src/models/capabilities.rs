//! Model capabilities descriptor.

use serde::{Deserialize, Serialize};

use crate::types::{Cost, Usage};

/// Describes what a model can do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCapabilities {
    pub supports_vision: bool,
    pub supports_tools: bool,
    pub supports_streaming: bool,
    pub supports_json_mode: bool,
    pub context_length: u32,
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            supports_vision: false,
            supports_tools: false,
            supports_streaming: true,
            supports_json_mode: false,
            context_length: 4096,
            max_output_tokens: None,
            pricing: None,
        }
    }
}

impl ModelCapabilities {
    /// Full-featured model capabilities.
    pub fn full(context_length: u32) -> Self {
        Self {
            supports_vision: true,
            supports_tools: true,
            supports_streaming: true,
            supports_json_mode: true,
            context_length,
            max_output_tokens: None,
            pricing: None,
        }
    }

    /// Estimated cost of `usage`, when pricing is known.
    pub fn cost(&self, usage: &Usage) -> Option<Cost> {
        self.pricing
            .map(|p| Cost::from_usage(usage, p.input_per_million, p.output_per_million))
    }
}

/// USD price per million tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }
}
