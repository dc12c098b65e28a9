//! Error types for Colloquy.

pub mod unified;

pub use unified::{ErrorCategory, ErrorDetails, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all Colloquy operations.
#[derive(Error, Debug)]
pub enum ColloquyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error (status {status:?}): {message}")]
    Transport { status: Option<u16>, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ColloquyError>,
    },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<ErrorDetails>,
    },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid arguments for tool '{tool_name}': {message}")]
    ToolArgument { tool_name: String, message: String },

    #[error("Tool '{tool_name}' failed: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool loop exceeded {limit} rounds")]
    ToolLoopExceeded { limit: usize },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Callback '{event}' failed: {message}")]
    Callback { event: String, message: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl ColloquyError {
    /// Create an API error without details.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(e) if e.is_timeout() => ErrorCategory::Timeout,
            Self::Network(e) if e.is_decode() => ErrorCategory::MalformedResponse,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Transport { .. } => ErrorCategory::Server,
            Self::RetriesExhausted { last, .. } => last.category(),
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::UnknownModel(_) => ErrorCategory::UnknownModel,
            Self::UnsupportedCapability(_) => ErrorCategory::Capability,
            Self::MalformedResponse(_) => ErrorCategory::MalformedResponse,
            Self::ToolArgument { .. } | Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::ToolLoopExceeded { .. } => ErrorCategory::ToolLoop,
            Self::Persistence(_) => ErrorCategory::Persistence,
            Self::Callback { .. } => ErrorCategory::Callback,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether the transport may resend the request after this error.
    ///
    /// `RetriesExhausted` is terminal even though its inner error was not.
    pub fn is_retryable(&self) -> bool {
        if matches!(self, Self::RetriesExhausted { .. }) {
            return false;
        }
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Server-requested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(std::time::Duration::from_millis(*ms)),
            _ => None,
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::UnknownModel | ErrorCategory::Capability => {
                RecoverySuggestion::ChooseAnotherModel
            }
            ErrorCategory::ToolExecution | ErrorCategory::ToolLoop => {
                RecoverySuggestion::CheckToolImplementation
            }
            ErrorCategory::Persistence | ErrorCategory::Callback | ErrorCategory::Cancelled => {
                RecoverySuggestion::RetryTurn
            }
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ColloquyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_retries_keep_inner_category_but_stop_retrying() {
        let err = ColloquyError::RetriesExhausted {
            attempts: 4,
            last: Box::new(ColloquyError::Transport {
                status: Some(503),
                message: "unavailable".into(),
            }),
        };

        assert_eq!(err.category(), ErrorCategory::Server);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("4 attempts"));
    }

    #[test]
    fn api_status_maps_to_category() {
        assert_eq!(ColloquyError::api(401, "x").category(), ErrorCategory::Authentication);
        assert_eq!(ColloquyError::api(429, "x").category(), ErrorCategory::RateLimit);
        assert_eq!(ColloquyError::api(502, "x").category(), ErrorCategory::Server);
        assert_eq!(ColloquyError::api(400, "x").category(), ErrorCategory::Api);
        assert!(!ColloquyError::api(400, "x").is_retryable());
    }
}
