//! The conversation driver.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::catalog::translate;
use crate::conversation::Conversation;
use crate::model::{Backend, ModelRequest, ToolCall, ToolResult, Usage};
use crate::tools::{ToolError, ToolHost};
use crate::{Error, Result};

/// Default bound on tool-execution rounds per run.
pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// What to do when the model calls a tool the host never advertised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownOperationPolicy {
    /// Answer the call with an error result and let the model react.
    #[default]
    Report,
    /// End the run with [`Error::UnknownOperation`].
    Abort,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_rounds: usize,
    pub system: Option<String>,
    /// Upper bound on a single tool call.
    pub tool_timeout: Option<Duration>,
    pub unknown_operation: UnknownOperationPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            system: None,
            tool_timeout: None,
            unknown_operation: UnknownOperationPolicy::default(),
        }
    }
}

impl AgentConfig {
    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn tool_timeout(mut self, limit: Duration) -> Self {
        self.tool_timeout = Some(limit);
        self
    }

    pub fn unknown_operation(mut self, policy: UnknownOperationPolicy) -> Self {
        self.unknown_operation = policy;
        self
    }
}

/// The outcome of one [`Agent::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Tool-execution rounds taken before the final reply.
    pub rounds: usize,
    pub usage: Usage,
}

/// Drives a model through tool calls against a host until it answers.
pub struct Agent<B: Backend, H: ToolHost> {
    backend: B,
    host: H,
    config: AgentConfig,
    tools: Vec<B::Tool>,
    names: HashSet<String>,
}

impl<B: Backend, H: ToolHost> Agent<B, H> {
    /// Translate the host's catalog for `backend`.
    pub fn new(backend: B, host: H, config: AgentConfig) -> Result<Self> {
        let tools = translate::<B::Tool>(host.specs())?;
        let names = host.specs().iter().map(|s| s.name.clone()).collect();
        Ok(Self {
            backend,
            host,
            config,
            tools,
            names,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Tool declarations sent with every model call.
    pub fn tools(&self) -> &[B::Tool] {
        &self.tools
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Add `input` to the conversation and drive it until the model replies
    /// without requesting tools.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        input: impl Into<String>,
    ) -> Result<Answer> {
        let span = info_span!("conversation", id = %conversation.id());
        let input = input.into();
        self.drive(conversation, input).instrument(span).await
    }

    async fn drive(&self, conversation: &mut Conversation, input: String) -> Result<Answer> {
        conversation.push_user(input)?;

        let mut rounds = 0;
        let mut usage = Usage::default();

        loop {
            let request = ModelRequest {
                system: self.config.system.as_deref(),
                messages: conversation.messages(),
                tools: &self.tools,
            };
            let response = self.backend.call(request).await.inspect_err(|e| {
                warn!(error = %e, "model call failed");
            })?;
            usage += response.usage;

            let calls = response.message.tool_calls();
            if calls.is_empty() {
                let text = response.message.text();
                conversation.push_assistant(response.message)?;
                info!(rounds, "model answered");
                return Ok(Answer {
                    text,
                    rounds,
                    usage,
                });
            }

            if rounds >= self.config.max_rounds {
                warn!(rounds, "round limit reached");
                return Err(Error::RoundLimit(self.config.max_rounds));
            }

            conversation.push_assistant(response.message)?;
            rounds += 1;
            debug!(round = rounds, calls = calls.len(), "executing tool calls");

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                results.push(self.execute(call).await?);
            }
            conversation.push_results(results)?;
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        info!(tool = %call.name, id = %call.id, "tool call");

        let outcome = if self.names.contains(&call.name) {
            self.invoke(call).await
        } else {
            match self.config.unknown_operation {
                UnknownOperationPolicy::Abort => {
                    return Err(Error::UnknownOperation(call.name.clone()));
                }
                UnknownOperationPolicy::Report => {
                    Err(ToolError::UnknownOperation(call.name.clone()))
                }
            }
        };

        let tool_call_id = call.id.clone();
        Ok(match outcome {
            Ok(output) => {
                debug!(tool = %call.name, %output, "tool succeeded");
                ToolResult::Success {
                    tool_call_id,
                    output,
                }
            }
            Err(error) => {
                warn!(tool = %call.name, %error, "tool failed");
                ToolResult::Failure {
                    tool_call_id,
                    error,
                }
            }
        })
    }

    async fn invoke(&self, call: &ToolCall) -> std::result::Result<Value, ToolError> {
        match self.config.tool_timeout {
            Some(limit) => timeout(limit, self.host.execute(call))
                .await
                .unwrap_or_else(|_| Err(ToolError::timeout(limit))),
            None => self.host.execute(call).await,
        }
    }
}
