//! Model definitions, the static catalog, and model-to-provider resolution.

pub mod capabilities;
pub mod catalog;
pub mod provider_key;
pub mod registry;

pub use capabilities::{ModelCapabilities, Pricing};
pub use provider_key::ProviderKey;
pub use registry::{ModelRegistry, Resolved};

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What a model produces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelKind {
    Chat,
    Embedding,
    Image,
}

/// A model known to the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub id: String,
    pub provider: ProviderKey,
    pub kind: ModelKind,
    pub display_name: String,
    pub capabilities: ModelCapabilities,
}

impl Model {
    /// A chat model with explicit capabilities, for registering models the
    /// catalog does not know.
    pub fn chat(
        id: impl Into<String>,
        provider: ProviderKey,
        capabilities: ModelCapabilities,
    ) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            provider,
            kind: ModelKind::Chat,
            capabilities,
        }
    }

    pub fn supports_tools(&self) -> bool {
        self.capabilities.supports_tools
    }

    pub fn supports_vision(&self) -> bool {
        self.capabilities.supports_vision
    }

    pub fn supports_streaming(&self) -> bool {
        self.capabilities.supports_streaming
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.id)
    }
}
