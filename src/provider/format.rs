//! Provider formatting helpers.

use serde_json::Value;

use crate::types::{Message, Role};

/// Render tool-call arguments as the JSON string OpenAI-style APIs expect.
///
/// Arguments that never parsed are stored as a string and sent back verbatim.
pub(crate) fn arguments_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Arguments as a JSON object for providers that take structured input.
pub(crate) fn arguments_to_object(value: &Value) -> Value {
    match value {
        Value::Object(_) => value.clone(),
        Value::Null => Value::Object(Default::default()),
        other => serde_json::json!({ "input": other }),
    }
}

/// Joined text of every system message, in order.
pub(crate) fn system_text(messages: &[Message]) -> Option<String> {
    let parts: Vec<String> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(Message::text)
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

/// Name of the tool that produced a result, recovered from the assistant
/// message that issued the call.
pub(crate) fn tool_name_for<'a>(messages: &'a [Message], tool_call_id: &str) -> Option<&'a str> {
    messages
        .iter()
        .flat_map(|m| m.tool_calls.iter())
        .find(|call| call.id == tool_call_id)
        .map(|call| call.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;
    use serde_json::json;

    #[test]
    fn unparsed_arguments_are_sent_verbatim() {
        assert_eq!(arguments_to_string(&json!("{oops")), "{oops");
        assert_eq!(arguments_to_string(&json!({"a": 1})), "{\"a\":1}");
    }

    #[test]
    fn finds_tool_name_for_result() {
        let mut assistant = Message::assistant("");
        assistant.tool_calls = vec![ToolCall::new("c1", "weather", json!({}))];
        let messages = vec![Message::user("hi"), assistant];

        assert_eq!(tool_name_for(&messages, "c1"), Some("weather"));
        assert_eq!(tool_name_for(&messages, "c2"), None);
    }

    #[test]
    fn system_text_joins_in_order() {
        let messages = vec![Message::system("a"), Message::system("b"), Message::user("u")];
        assert_eq!(system_text(&messages).as_deref(), Some("a\n\nb"));
    }
}
