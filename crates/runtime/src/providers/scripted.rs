//! A backend that replays canned replies.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::catalog::Declaration;
use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, ToolCall, ToolSpec, Usage,
};

/// What the backend saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

/// Replies come out in the order they were queued. Once the queue is empty
/// every call fails with [`ModelError::InvalidResponse`].
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, message: Message) -> Self {
        self.push(Ok(ModelResponse {
            message,
            usage: Usage {
                input_tokens: 1,
                output_tokens: 1,
            },
        }))
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.reply(Message::assistant(text))
    }

    pub fn tool_calls(self, calls: impl IntoIterator<Item = ToolCall>) -> Self {
        self.reply(Message::tool_calls_from(calls))
    }

    pub fn fail(self, error: ModelError) -> Self {
        self.push(Err(error))
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn push(self, reply: Result<ModelResponse, ModelError>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }
}

impl Backend for ScriptedBackend {
    type Tool = ToolSpec;

    async fn call(&self, request: ModelRequest<'_, ToolSpec>) -> Result<ModelResponse, ModelError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                system: request.system.map(str::to_string),
                messages: request.messages.to_vec(),
                tools: request.tools.iter().map(|t| t.name().to_string()).collect(),
            });

        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::InvalidResponse("script exhausted".into())))
    }
}
