//! LLM provider adapters.
//!
//! Each provider implements the backend trait for its specific API.

mod anthropic;
mod openai;
mod scripted;

pub use anthropic::{AnthropicBackend, AnthropicBackendBuilder, AnthropicTool};
pub use openai::{FunctionTool, OpenAiBackend, OpenAiBackendBuilder};
pub use scripted::{RecordedRequest, ScriptedBackend};
