//! Deskmate runtime: provider-agnostic model types, tool hosts and the
//! conversation driver.
//!
//! # Overview
//!
//! - **Backend**: a trait over completion providers (OpenAI, Ollama,
//!   Anthropic, and a scripted one for tests). Each backend names its own
//!   tool declaration type.
//! - **ToolHost**: where tool calls run. [`McpToolHost`] talks to an MCP
//!   server process.
//! - **Agent**: loops model call → tool execution → model call until the
//!   model answers, within a round limit.
//!
//! # Example
//!
//! ```no_run
//! use mcp::ClientConfig;
//! use runtime::{Agent, AgentConfig, Conversation, McpToolHost, OpenAiBackend};
//!
//! # async fn example() -> runtime::Result<()> {
//! let host = McpToolHost::spawn(ClientConfig::new("desk", "deskmate").args(["serve"]), None).await?;
//! let backend = OpenAiBackend::builder("gpt-4.1-2025-04-14").api_key("sk-...").build();
//!
//! let agent = Agent::new(backend, host, AgentConfig::default())?;
//! let mut conversation = Conversation::new();
//! let answer = agent.run(&mut conversation, "Show me recent customers").await?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

mod agent;
pub mod catalog;
mod conversation;
mod error;
pub mod model;
pub mod providers;
pub mod tools;

pub use agent::{Agent, AgentConfig, Answer, DEFAULT_MAX_ROUNDS, UnknownOperationPolicy};
pub use catalog::{CatalogError, Declaration};
pub use conversation::{Conversation, ConversationId};
pub use error::{Error, Result};
pub use model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolResult,
    ToolSpec, Usage,
};
pub use providers::{
    AnthropicBackend, AnthropicTool, FunctionTool, OpenAiBackend, ScriptedBackend,
};
pub use tools::{EmptyToolHost, McpToolHost, ToolError, ToolHost};
