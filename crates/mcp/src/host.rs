//! Host side of the connection: answer requests read from a line stream.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::client::MAX_OUTPUT_SIZE;
use crate::error::Result;
use crate::protocol::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, PROTOCOL_VERSION, Prompt,
    PromptsCapability, ReadResourceParams, ReadResourceResult, Resource, ResourceTemplate,
    ResourcesCapability, ServerCapabilities, ServerInfo, Tool, ToolsCapability,
};

/// What a tool host exposes.
///
/// Errors are returned as [`JsonRpcError`]s and sent back verbatim; tool-level
/// failures that the model should see belong in a [`CallToolResult::error`].
pub trait Handler: Send + Sync {
    fn server_info(&self) -> ServerInfo;

    fn instructions(&self) -> Option<String> {
        None
    }

    fn list_tools(&self) -> Vec<Tool>;

    fn call_tool(
        &self,
        params: CallToolParams,
    ) -> impl Future<Output = std::result::Result<CallToolResult, JsonRpcError>> + Send;

    fn list_resources(&self) -> impl Future<Output = Vec<Resource>> + Send {
        async { Vec::new() }
    }

    fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        Vec::new()
    }

    fn read_resource(
        &self,
        uri: &str,
    ) -> impl Future<Output = std::result::Result<ReadResourceResult, JsonRpcError>> + Send {
        let error = JsonRpcError::resource_not_found(uri);
        async move { Err(error) }
    }

    fn list_prompts(&self) -> Vec<Prompt> {
        Vec::new()
    }

    fn get_prompt(&self, params: GetPromptParams) -> std::result::Result<GetPromptResult, JsonRpcError> {
        Err(JsonRpcError::invalid_params(format!(
            "unknown prompt: {}",
            params.name
        )))
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            resources: (!self.list_resource_templates().is_empty())
                .then(ResourcesCapability::default),
            prompts: (!self.list_prompts().is_empty()).then(PromptsCapability::default),
        }
    }
}

/// Serve `handler` on the process's stdin/stdout until stdin closes.
pub async fn serve_stdio<H: Handler>(handler: &H) -> Result<()> {
    serve(handler, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Serve `handler` on a line-delimited stream until it reaches EOF.
///
/// Requests are handled one at a time, in arrival order.
pub async fn serve<H, R, W>(handler: &H, mut reader: R, mut writer: W) -> Result<()>
where
    H: Handler,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let info = handler.server_info();
    info!(server = %info.name, "tool host ready");

    let mut initialized = false;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }

        if line.len() > MAX_OUTPUT_SIZE {
            warn!(size = line.len(), "dropping oversized request");
            let error = JsonRpcError::invalid_request(format!(
                "request too large: {} bytes (max {MAX_OUTPUT_SIZE})",
                line.len()
            ));
            write_response(&mut writer, &JsonRpcResponse::failure(None, error)).await?;
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => {
                let error = JsonRpcError::parse_error(e.to_string());
                write_response(&mut writer, &JsonRpcResponse::failure(None, error)).await?;
                continue;
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value
                    .get("id")
                    .and_then(|id| serde_json::from_value(id.clone()).ok());
                let error = JsonRpcError::invalid_request(e.to_string());
                write_response(&mut writer, &JsonRpcResponse::failure(id, error)).await?;
                continue;
            }
        };

        if request.is_notification() {
            debug!(method = %request.method, "notification");
            continue;
        }

        let id = request.id.clone();
        let response = match dispatch(handler, &mut initialized, request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        };
        write_response(&mut writer, &response).await?;
    }

    info!(server = %info.name, "input closed, shutting down");
    Ok(())
}

async fn dispatch<H: Handler>(
    handler: &H,
    initialized: &mut bool,
    request: JsonRpcRequest,
) -> std::result::Result<Value, JsonRpcError> {
    let method = request.method.as_str();
    debug!(%method, "request");

    match method {
        "initialize" => {
            let params: InitializeParams = parse_params(request.params)?;
            debug!(
                client = %params.client_info.name,
                protocol = %params.protocol_version,
                "initialize"
            );
            *initialized = true;
            to_value(&InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: handler.capabilities(),
                server_info: handler.server_info(),
                instructions: handler.instructions(),
            })
        }
        "ping" => Ok(Value::Object(Default::default())),
        _ if !*initialized => Err(JsonRpcError::invalid_request("server not initialized")),
        "tools/list" => to_value(&ListToolsResult {
            tools: handler.list_tools(),
        }),
        "tools/call" => {
            let params: CallToolParams = parse_params(request.params)?;
            let result = handler.call_tool(params).await?;
            to_value(&result)
        }
        "resources/list" => to_value(&ListResourcesResult {
            resources: handler.list_resources().await,
        }),
        "resources/templates/list" => to_value(&ListResourceTemplatesResult {
            resource_templates: handler.list_resource_templates(),
        }),
        "resources/read" => {
            let params: ReadResourceParams = parse_params(request.params)?;
            let result = handler.read_resource(&params.uri).await?;
            to_value(&result)
        }
        "prompts/list" => to_value(&ListPromptsResult {
            prompts: handler.list_prompts(),
        }),
        "prompts/get" => {
            let params: GetPromptParams = parse_params(request.params)?;
            to_value(&handler.get_prompt(params)?)
        }
        other => Err(JsonRpcError::method_not_found(other)),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> std::result::Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn to_value(result: &impl Serialize) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(result).map_err(|e| JsonRpcError::internal(e.to_string()))
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> Result<()> {
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codes;
    use crate::{Client, Error};
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    struct Echo;

    impl Handler for Echo {
        fn server_info(&self) -> ServerInfo {
            ServerInfo {
                name: "echo".into(),
                version: None,
            }
        }

        fn list_tools(&self) -> Vec<Tool> {
            vec![Tool {
                name: "echo".into(),
                description: Some("Echo the input back".into()),
                input_schema: json!({"type": "object"}),
            }]
        }

        async fn call_tool(
            &self,
            params: CallToolParams,
        ) -> std::result::Result<CallToolResult, JsonRpcError> {
            match params.name.as_str() {
                "echo" => Ok(CallToolResult::text(
                    params.arguments.unwrap_or(Value::Null).to_string(),
                )),
                "fail" => Ok(CallToolResult::error("it broke")),
                other => Err(JsonRpcError::tool_not_found(other)),
            }
        }
    }

    fn start_host() -> Client {
        let (client_io, host_io) = duplex(64 * 1024);
        tokio::spawn(async move {
            let (read, write) = tokio::io::split(host_io);
            serve(&Echo, BufReader::new(read), write).await
        });
        let (read, write) = tokio::io::split(client_io);
        Client::connect("echo", read, write)
    }

    #[tokio::test]
    async fn handshake_lists_tools() {
        let client = start_host();
        let info = client.initialize().await.unwrap();
        assert_eq!(info.server_info.name, "echo");
        assert_eq!(info.protocol_version, PROTOCOL_VERSION);
        assert!(info.capabilities.resources.is_none());

        let tools = client.tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
    }

    #[tokio::test]
    async fn tool_errors_map_to_client_errors() {
        let client = start_host();
        client.initialize().await.unwrap();

        let ok = client.call_tool("echo", Some(json!({"a": 1}))).await.unwrap();
        assert_eq!(ok.joined_text(), r#"{"a":1}"#);

        let failed = client.call_tool("fail", None).await.unwrap_err();
        assert!(matches!(failed, Error::ToolCallFailed(ref text) if text == "it broke"));

        let missing = client.call_tool("nope", None).await.unwrap_err();
        assert_eq!(missing.rpc_code(), Some(codes::TOOL_NOT_FOUND));

        let resource = client.read_resource("customer://1").await.unwrap_err();
        assert_eq!(resource.rpc_code(), Some(codes::RESOURCE_NOT_FOUND));
    }

    #[tokio::test]
    async fn raw_protocol_errors() {
        let (client_io, host_io) = duplex(64 * 1024);
        let host = tokio::spawn(async move {
            let (read, write) = tokio::io::split(host_io);
            serve(&Echo, BufReader::new(read), write).await
        });

        let (read, mut write) = tokio::io::split(client_io);
        let mut lines = BufReader::new(read).lines();

        // Before the handshake only initialize and ping are accepted.
        write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n")
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["error"]["code"], codes::INVALID_REQUEST);

        write.write_all(b"not json\n").await.unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], codes::PARSE_ERROR);

        let initialize = JsonRpcRequest::new(2i64, "initialize").with_params(InitializeParams::default());
        write
            .write_all(format!("{}\n", serde_json::to_string(&initialize).unwrap()).as_bytes())
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["id"], 2);
        assert_eq!(reply["result"]["serverInfo"]["name"], "echo");

        write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"bogus/method\"}\n")
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], codes::METHOD_NOT_FOUND);

        // Closing input ends the loop cleanly.
        write.shutdown().await.unwrap();
        assert!(host.await.unwrap().is_ok());
    }
}
