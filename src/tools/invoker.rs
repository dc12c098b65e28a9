//! Runs tool calls without letting their failures escape.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolContext, ToolSet};
use super::validation::validate_arguments;
use crate::error::{ColloquyError, Result};
use crate::types::ToolCall;

/// Result of one tool call, ready to become a tool-role message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn success(call: &ToolCall, value: Value) -> Self {
        let content = match value {
            Value::String(text) => text,
            other => other.to_string(),
        };
        Self {
            tool_call_id: call.id.clone(),
            content,
            is_error: false,
        }
    }

    fn failure(call: &ToolCall, error: &ColloquyError) -> Self {
        warn!(tool = %call.name, call_id = %call.id, error = %error, "Tool call failed");
        let message = match error {
            ColloquyError::ToolArgument { message, .. }
            | ColloquyError::ToolExecution { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            tool_call_id: call.id.clone(),
            content: json!({ "error": message }).to_string(),
            is_error: true,
        }
    }
}

/// Dispatches tool calls to the registered tools by name.
#[derive(Debug, Clone, Default)]
pub struct ToolInvoker {
    tools: ToolSet,
}

impl ToolInvoker {
    pub fn new(tools: ToolSet) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if self.tools.insert(tool.clone()).is_some() {
            debug!(tool = tool.name(), "Replaced tool");
        }
    }

    /// Execute one call. Unknown tools, invalid arguments, errors and panics
    /// all become error outcomes.
    pub async fn invoke(&self, call: &ToolCall, conversation_id: Uuid) -> ToolOutcome {
        match self.try_invoke(call, conversation_id).await {
            Ok(value) => ToolOutcome::success(call, value),
            Err(error) => ToolOutcome::failure(call, &error),
        }
    }

    async fn try_invoke(&self, call: &ToolCall, conversation_id: Uuid) -> Result<Value> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ColloquyError::tool_execution(&call.name, format!("Tool '{}' not found", call.name)))?;

        validate_arguments(&call.name, &call.arguments, &tool.parameters().schema)?;

        let args = ToolArguments::new(&call.name, call.arguments.clone());
        let ctx = ToolContext {
            tool_call_id: call.id.clone(),
            conversation_id,
        };
        debug!(tool = %call.name, call_id = %call.id, "Executing tool");

        match AssertUnwindSafe(tool.execute(&args, &ctx)).catch_unwind().await {
            Ok(result) => result.map_err(|e| match e {
                e @ (ColloquyError::ToolArgument { .. } | ColloquyError::ToolExecution { .. }) => e,
                other => ColloquyError::tool_execution(&call.name, other.to_string()),
            }),
            Err(panic) => Err(ColloquyError::tool_execution(
                &call.name,
                format!("tool panicked: {}", panic_message(panic.as_ref())),
            )),
        }
    }

    /// Execute calls and return outcomes in call order.
    pub async fn invoke_all(&self, calls: &[ToolCall], conversation_id: Uuid, parallel: bool) -> Vec<ToolOutcome> {
        if parallel {
            join_all(calls.iter().map(|call| self.invoke(call, conversation_id))).await
        } else {
            let mut outcomes = Vec::with_capacity(calls.len());
            for call in calls {
                outcomes.push(self.invoke(call, conversation_id).await);
            }
            outcomes
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
