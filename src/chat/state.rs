use serde::{Deserialize, Serialize};
use strum::Display;

/// Where a session is in its ask/tool-loop cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// Nothing asked yet, or the model was just switched.
    #[default]
    Idle,
    /// A provider request is in flight.
    AwaitingResponse,
    /// Tool calls from the last response are running.
    ExecutingTools,
    /// The last turn produced a final answer.
    Done,
    /// The last turn ended with a fatal error.
    Failed,
}

impl SessionState {
    /// Whether a new `ask` may start from this state.
    pub fn accepts_input(self) -> bool {
        matches!(self, Self::Idle | Self::Done | Self::Failed)
    }
}
