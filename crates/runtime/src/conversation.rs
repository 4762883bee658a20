//! Append-only message history with tool-call bookkeeping.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Message, ModelError, Part, Role, ToolCall, ToolResult};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The messages exchanged with a model.
///
/// Every tool call of an assistant turn must be answered before the model
/// is consulted again, and results may only answer calls of the latest
/// assistant turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    id: ConversationId,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> ConversationId {
        self.id
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

    /// Calls of the latest assistant turn that have no result yet.
    pub fn pending_calls(&self) -> Vec<&ToolCall> {
        let Some(turn) = self.messages.iter().rposition(|m| m.role == Role::Assistant) else {
            return Vec::new();
        };

        let answered: HashSet<&str> = self.messages[turn + 1..]
            .iter()
            .flat_map(Message::results)
            .map(ToolResult::tool_call_id)
            .collect();

        self.messages[turn]
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) if !answered.contains(call.id.as_str()) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Append user text.
    pub fn push_user(&mut self, text: impl Into<String>) -> Result<()> {
        self.ensure_settled()?;
        self.messages.push(Message::user(text));
        Ok(())
    }

    /// Append a model reply.
    pub fn push_assistant(&mut self, message: Message) -> Result<()> {
        if message.role != Role::Assistant {
            return Err(Error::InvalidState(format!(
                "expected an assistant message, got {:?}",
                message.role
            )));
        }
        self.ensure_settled()?;

        let mut ids = HashSet::new();
        for call in message.tool_calls() {
            if !ids.insert(call.id.clone()) {
                return Err(ModelError::InvalidResponse(format!(
                    "tool call id `{}` repeated within one turn",
                    call.id
                ))
                .into());
            }
        }

        self.messages.push(message);
        Ok(())
    }

    /// Append one message answering pending calls.
    pub fn push_results(&mut self, results: Vec<ToolResult>) -> Result<()> {
        let mut pending: HashSet<String> = self
            .pending_calls()
            .into_iter()
            .map(|call| call.id.clone())
            .collect();

        for result in &results {
            if !pending.remove(result.tool_call_id()) {
                return Err(Error::InvalidState(format!(
                    "no pending tool call with id `{}`",
                    result.tool_call_id()
                )));
            }
        }

        self.messages.push(Message::tool_results(results));
        Ok(())
    }

    /// Text of the latest assistant message.
    pub fn last_reply(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(Message::text)
    }

    fn ensure_settled(&self) -> Result<()> {
        let pending = self.pending_calls();
        if pending.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = pending.iter().map(|c| c.id.as_str()).collect();
        Err(Error::InvalidState(format!(
            "tool calls awaiting results: {}",
            ids.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "get_recent_customers", json!({}))
    }

    fn ok(id: &str) -> ToolResult {
        ToolResult::Success {
            tool_call_id: id.to_string(),
            output: json!([]),
        }
    }

    #[test]
    fn plain_exchange() {
        let mut conv = Conversation::new();
        conv.push_user("hi").unwrap();
        conv.push_assistant(Message::assistant("hello")).unwrap();
        conv.push_user("bye").unwrap();
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.last_reply().as_deref(), Some("hello"));
    }

    #[test]
    fn calls_must_be_answered_before_resuming() {
        let mut conv = Conversation::new();
        conv.push_user("list customers").unwrap();
        conv.push_assistant(Message::tool_calls_from([call("a"), call("b")]))
            .unwrap();

        assert!(matches!(conv.push_user("again"), Err(Error::InvalidState(_))));
        assert!(matches!(
            conv.push_assistant(Message::assistant("done")),
            Err(Error::InvalidState(_))
        ));

        conv.push_results(vec![ok("a")]).unwrap();
        let pending: Vec<_> = conv.pending_calls().iter().map(|c| c.id.clone()).collect();
        assert_eq!(pending, vec!["b"]);

        conv.push_results(vec![ok("b")]).unwrap();
        assert!(conv.pending_calls().is_empty());
        conv.push_assistant(Message::assistant("done")).unwrap();
    }

    #[test]
    fn results_must_match_a_pending_call() {
        let mut conv = Conversation::new();
        assert!(matches!(
            conv.push_results(vec![ok("x")]),
            Err(Error::InvalidState(_))
        ));

        conv.push_user("go").unwrap();
        conv.push_assistant(Message::tool_calls_from([call("a")]))
            .unwrap();
        assert!(conv.push_results(vec![ok("zzz")]).is_err());
        assert!(conv.push_results(vec![ok("a"), ok("a")]).is_err());
        conv.push_results(vec![ok("a")]).unwrap();
        assert!(conv.push_results(vec![ok("a")]).is_err());
    }

    #[test]
    fn results_cannot_answer_older_turns() {
        let mut conv = Conversation::new();
        conv.push_user("go").unwrap();
        conv.push_assistant(Message::tool_calls_from([call("old")]))
            .unwrap();
        conv.push_results(vec![ok("old")]).unwrap();
        conv.push_assistant(Message::tool_calls_from([call("new")]))
            .unwrap();
        assert!(conv.push_results(vec![ok("old")]).is_err());
    }

    #[test]
    fn duplicate_call_ids_are_a_provider_error() {
        let mut conv = Conversation::new();
        conv.push_user("go").unwrap();
        let err = conv
            .push_assistant(Message::tool_calls_from([call("a"), call("a")]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Provider(ModelError::InvalidResponse(_))
        ));
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn only_assistant_messages_are_replies() {
        let mut conv = Conversation::new();
        assert!(conv.push_assistant(Message::user("sneaky")).is_err());
    }

    #[test]
    fn ids_are_distinct() {
        assert_ne!(Conversation::new().id(), Conversation::new().id());
    }
}
