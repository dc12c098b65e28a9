//! Typed provider identifiers and alias handling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ColloquyError;

/// Canonical provider keys used across the catalog, config, and adapter wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKey {
    OpenAi,
    Anthropic,
    Gemini,
    DeepSeek,
    Bedrock,
}

impl ProviderKey {
    pub const ALL: [ProviderKey; 5] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::Gemini,
        Self::DeepSeek,
        Self::Bedrock,
    ];

    /// Canonical provider key string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::Bedrock => "bedrock",
        }
    }

    /// Parse user-facing provider aliases into a typed provider key.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "gemini" | "google" => Some(Self::Gemini),
            "deepseek" | "deep-seek" => Some(Self::DeepSeek),
            "bedrock" | "aws" | "aws-bedrock" => Some(Self::Bedrock),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKey {
    type Err = ColloquyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| ColloquyError::Configuration(format!("unknown provider '{s}'")))
    }
}

impl Serialize for ProviderKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unknown provider '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::ProviderKey;

    #[test]
    fn parses_aliases() {
        assert_eq!(ProviderKey::parse("google"), Some(ProviderKey::Gemini));
        assert_eq!(ProviderKey::parse("Claude"), Some(ProviderKey::Anthropic));
        assert_eq!(ProviderKey::parse("aws"), Some(ProviderKey::Bedrock));
        assert_eq!(ProviderKey::parse("mistral"), None);
    }

    #[test]
    fn canonical_names_round_trip() {
        for key in ProviderKey::ALL {
            assert_eq!(ProviderKey::parse(key.as_str()), Some(key));
            assert_eq!(key.to_string(), key.as_str());
        }
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&ProviderKey::DeepSeek).unwrap();
        assert_eq!(json, "\"deepseek\"");
        let back: ProviderKey = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(back, ProviderKey::Gemini);
    }
}
