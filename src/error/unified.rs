//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Serialization,
    UnknownModel,
    Capability,
    MalformedResponse,
    ToolExecution,
    ToolLoop,
    Persistence,
    Callback,
    Cancelled,
    Unknown,
}

/// Structured details returned by a provider API alongside an error status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Provider error type, e.g. `invalid_request_error`.
    pub error_type: Option<String>,
    /// Provider error code, e.g. `context_length_exceeded`.
    pub provider_code: Option<String>,
    pub request_id: Option<String>,
}

impl ErrorDetails {
    pub fn is_empty(&self) -> bool {
        self.error_type.is_none() && self.provider_code.is_none() && self.request_id.is_none()
    }
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    ChooseAnotherModel,
    CheckToolImplementation,
    RetryTurn,
    ContactSupport,
}
