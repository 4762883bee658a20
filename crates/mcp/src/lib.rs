//! MCP (Model Context Protocol) over stdio, both ends.
//!
//! This crate speaks newline-delimited JSON-RPC 2.0. A tool host implements
//! [`Handler`] and runs [`serve_stdio`]; an agent launches that host as a child
//! process with [`Client::spawn`] and talks to it.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Client, ClientConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ClientConfig::new("desk", "deskmate").args(["serve"]);
//!
//! let client = Client::spawn(config).await?;
//! client.initialize().await?;
//!
//! for tool in client.tools().await {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = client
//!     .call_tool("get_recent_customers", Some(serde_json::json!({ "limit": 5 })))
//!     .await?;
//! println!("{}", result.joined_text());
//!
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod host;
mod protocol;

pub use client::{Client, ClientConfig, DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE};
pub use error::{Error, Result};
pub use host::{Handler, serve, serve_stdio};
pub use protocol::{
    CallToolParams, CallToolResult, ClientCapabilities, GetPromptParams, GetPromptResult,
    Implementation, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult,
    ListToolsResult, PROTOCOL_VERSION, Prompt, PromptArgument, PromptMessage, PromptRole,
    ReadResourceParams, ReadResourceResult, RequestId, Resource, ResourceContents,
    ResourceTemplate, ServerCapabilities, ServerInfo, Tool, ToolContent, codes,
};
