//! Ordered message history.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Message, Role, ToolCall, Usage};

/// A conversation's transcript.
///
/// Messages only ever get appended, except for the leading block of system
/// messages, which instructions may extend or replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub(crate) fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Number of system messages at the start of the transcript.
    pub fn leading_system_len(&self) -> usize {
        self.messages
            .iter()
            .take_while(|m| m.role == Role::System)
            .count()
    }

    /// Insert a system message at the end of the leading system block.
    ///
    /// Its timestamp is pulled back to the following message's, if any, so
    /// the transcript stays chronological.
    pub(crate) fn insert_system(&mut self, mut message: Message) -> &Message {
        let index = self.leading_system_len();
        if let Some(next) = self.messages.get(index) {
            message.created_at = message.created_at.min(next.created_at);
        } else {
            message.created_at = message.created_at.min(Utc::now());
        }
        self.messages.insert(index, message);
        &self.messages[index]
    }

    /// Remove the leading system block and return it.
    pub(crate) fn remove_leading_system(&mut self) -> Vec<Message> {
        let count = self.leading_system_len();
        self.messages.drain(..count).collect()
    }

    /// Drop every message from `len` on and return them.
    pub(crate) fn truncate(&mut self, len: usize) -> Vec<Message> {
        if len >= self.messages.len() {
            return Vec::new();
        }
        self.messages.split_off(len)
    }

    /// The tool-role message answering `tool_call_id`.
    pub fn tool_result_for(&self, tool_call_id: &str) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some(tool_call_id))
    }

    /// Tool calls with no answering tool message.
    pub fn unresolved_tool_calls(&self) -> Vec<&ToolCall> {
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .filter(|call| self.tool_result_for(&call.id).is_none())
            .collect()
    }

    /// Sum of token usage over provider-originated messages.
    pub fn total_usage(&self) -> Usage {
        self.messages
            .iter()
            .filter_map(Message::usage)
            .fold(Usage::default(), |mut total, usage| {
                total.merge(&usage);
                total
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn system_insert_keeps_chronology() {
        let mut conversation = Conversation::new();
        let mut user = Message::user("hi");
        user.created_at -= Duration::seconds(10);
        conversation.push(user);

        conversation.insert_system(Message::system("be brief"));

        let messages = conversation.messages();
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].created_at <= messages[1].created_at);
    }

    #[test]
    fn system_block_is_leading_only() {
        let mut conversation = Conversation::new();
        conversation.push(Message::system("a"));
        conversation.push(Message::user("hi"));
        conversation.push(Message::system("late"));

        assert_eq!(conversation.leading_system_len(), 1);
        let removed = conversation.remove_leading_system();
        assert_eq!(removed.len(), 1);
        assert_eq!(conversation.messages()[0].text(), "hi");
    }

    #[test]
    fn tool_results_resolve_calls() {
        let mut conversation = Conversation::new();
        let mut assistant = Message::from_response(
            String::new(),
            vec![
                ToolCall::new("c1", "calculator", json!({})),
                ToolCall::new("c2", "calculator", json!({})),
            ],
            Some(Usage::new(10, 2)),
            "gpt-4o",
        );
        assistant.created_at = Utc::now();
        conversation.push(assistant);
        conversation.push(Message::tool_result("c1", "4"));

        assert_eq!(conversation.tool_result_for("c1").unwrap().text(), "4");
        let open: Vec<_> = conversation.unresolved_tool_calls().iter().map(|c| c.id.clone()).collect();
        assert_eq!(open, ["c2"]);
        assert_eq!(conversation.total_usage(), Usage::new(10, 2));
    }

    #[test]
    fn truncate_returns_removed_tail() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("a"));
        conversation.push(Message::user("b"));

        let tail = conversation.truncate(1);

        assert_eq!(tail.len(), 1);
        assert_eq!(conversation.len(), 1);
        assert!(conversation.truncate(5).is_empty());
    }
}
