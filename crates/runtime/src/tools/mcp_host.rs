//! MCP-backed tool host.

use std::collections::HashMap;
use std::time::Duration;

use mcp::{Client, ClientConfig, ResourceTemplate, codes};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::model::{ToolCall, ToolSpec};
use crate::tools::{ToolError, ToolHost};
use crate::{Error, Result};

/// Tool host backed by an MCP server.
pub struct McpToolHost {
    client: Client,
    specs: Vec<ToolSpec>,
}

impl McpToolHost {
    /// Spawn the host process, then [`connect`](Self::connect) to it.
    pub async fn spawn(config: ClientConfig, connect_timeout: Option<Duration>) -> Result<Self> {
        let command = config.command.clone();
        let client = Client::spawn(config)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        debug!(%command, "tool host launched");
        Self::connect(client, connect_timeout).await
    }

    /// Run the handshake on `client` and cache its tool catalog.
    ///
    /// `connect_timeout` bounds the whole handshake; each request is still
    /// bounded by the client's own timeout.
    pub async fn connect(client: Client, connect_timeout: Option<Duration>) -> Result<Self> {
        let handshake = client.initialize();
        let info = match connect_timeout {
            Some(limit) => timeout(limit, handshake).await.map_err(|_| {
                Error::Connection(format!("handshake timed out after {}ms", limit.as_millis()))
            })?,
            None => handshake.await,
        }
        .map_err(|e| Error::Connection(e.to_string()))?;

        let specs: Vec<ToolSpec> = client.tools().await.into_iter().map(ToolSpec::from).collect();
        info!(
            server = %info.server_info.name,
            protocol = %info.protocol_version,
            tools = specs.len(),
            "connected to tool host"
        );

        Ok(Self { client, specs })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Render a prompt template to text.
    pub async fn prompt(&self, name: &str, arguments: HashMap<String, String>) -> Result<String> {
        let result = self
            .client
            .get_prompt(name, arguments)
            .await
            .map_err(|e| tool_error(e, self.client.timeout()))?;
        Ok(result.text())
    }

    pub async fn resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        Ok(self
            .client
            .list_resource_templates()
            .await
            .map_err(|e| tool_error(e, self.client.timeout()))?)
    }

    /// Close the connection and wait for the host to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.client
            .shutdown()
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }
}

impl ToolHost for McpToolHost {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    async fn execute(&self, call: &ToolCall) -> std::result::Result<Value, ToolError> {
        let arguments = match &call.input {
            Value::Null => None,
            Value::Object(_) => Some(call.input.clone()),
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "arguments must be an object, got {other}"
                )));
            }
        };

        let result = self
            .client
            .call_tool(&call.name, arguments)
            .await
            .map_err(|e| tool_error(e, self.client.timeout()))?;

        Ok(parse_output(&result.joined_text()))
    }

    async fn read_resource(&self, uri: &str) -> std::result::Result<Value, ToolError> {
        let result = self
            .client
            .read_resource(uri)
            .await
            .map_err(|e| tool_error(e, self.client.timeout()))?;
        let text: String = result
            .contents
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect();
        Ok(parse_output(&text))
    }
}

/// Classify a host failure the way the model should see it.
fn tool_error(error: mcp::Error, limit: Duration) -> ToolError {
    match error {
        mcp::Error::ToolCallFailed(message) => ToolError::Domain(message),
        mcp::Error::Timeout => ToolError::timeout(limit),
        mcp::Error::JsonRpc(e) => match e.code {
            codes::TOOL_NOT_FOUND | codes::RESOURCE_NOT_FOUND => ToolError::NotFound(e.message),
            codes::INVALID_PARAMS => ToolError::InvalidInput(e.message),
            _ => ToolError::Execution(e.to_string()),
        },
        other => ToolError::Execution(other.to_string()),
    }
}

/// Hosts answer with text; structured results arrive as JSON text.
fn parse_output(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk::Desk;
    use serde_json::json;
    use tokio::io::{BufReader, duplex};

    async fn connect() -> McpToolHost {
        let (client_io, host_io) = duplex(64 * 1024);
        tokio::spawn(async move {
            let (read, write) = tokio::io::split(host_io);
            mcp::serve(&Desk::seeded(), BufReader::new(read), write).await
        });
        let (read, write) = tokio::io::split(client_io);
        let client = Client::connect("desk", read, write);
        McpToolHost::connect(client, Some(Duration::from_secs(5)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn caches_catalog_in_host_order() {
        let host = connect().await;
        let names: Vec<_> = host.specs().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "get_recent_customers",
                "create_support_ticket",
                "calculate_account_value"
            ]
        );
        assert!(host.specs().iter().all(|s| !s.description.is_empty()));
    }

    #[tokio::test]
    async fn output_is_parsed_json() {
        let host = connect().await;
        let call = ToolCall::new(
            "1",
            "calculate_account_value",
            json!({"customer_id": "12345", "purchase_history": [150, 300, 89]}),
        );
        let output = host.execute(&call).await.unwrap();
        assert_eq!(output["total_value"], 539.0);
        assert_eq!(output["average_purchase"], 179.67);
    }

    #[tokio::test]
    async fn failures_are_classified() {
        let host = connect().await;

        let unknown = ToolCall::new("1", "fly_to_moon", json!({}));
        assert!(matches!(
            host.execute(&unknown).await,
            Err(ToolError::NotFound(_))
        ));

        let invalid = ToolCall::new(
            "2",
            "create_support_ticket",
            json!({"customer_id": "12345", "subject": "s", "description": "d", "priority": "soon"}),
        );
        assert!(matches!(
            host.execute(&invalid).await,
            Err(ToolError::InvalidInput(_))
        ));

        let domain = ToolCall::new(
            "3",
            "create_support_ticket",
            json!({"customer_id": "00000", "subject": "s", "description": "d"}),
        );
        match host.execute(&domain).await {
            Err(ToolError::Domain(message)) => assert!(message.contains("00000")),
            other => panic!("expected domain error, got {other:?}"),
        }

        let not_object = ToolCall::new("4", "get_recent_customers", json!([1, 2]));
        assert!(matches!(
            host.execute(&not_object).await,
            Err(ToolError::InvalidInput(_))
        ));
    }

    #[test]
    fn request_timeout_is_a_tool_timeout() {
        assert_eq!(
            tool_error(mcp::Error::Timeout, Duration::from_secs(15)),
            ToolError::Timeout(15_000)
        );
        assert!(matches!(
            tool_error(mcp::Error::Desynced, Duration::from_secs(15)),
            ToolError::Execution(_)
        ));
    }

    #[tokio::test]
    async fn resources_and_prompts() {
        let host = connect().await;

        let customer = host.read_resource("customer://12345").await.unwrap();
        assert_eq!(customer["name"], "Alice Johnson");
        assert!(matches!(
            host.read_resource("customer://404").await,
            Err(ToolError::NotFound(_))
        ));

        let templates = host.resource_templates().await.unwrap();
        assert_eq!(templates.len(), 1);

        let arguments = HashMap::from([
            ("customer_name".to_string(), "Alice".to_string()),
            ("issue_type".to_string(), "Login".to_string()),
            ("resolution_steps".to_string(), r#"["Reset password"]"#.to_string()),
        ]);
        let text = host
            .prompt("customer_service_response", arguments)
            .await
            .unwrap();
        assert!(text.contains("1. Reset password"));

        host.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn silent_host_times_out() {
        let (client_io, _host_io) = duplex(1024);
        let (read, write) = tokio::io::split(client_io);
        let client = Client::connect("silent", read, write);
        let err = McpToolHost::connect(client, Some(Duration::from_millis(50)))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_connection_error() {
        let config = ClientConfig::new("missing", "/nonexistent/deskmate-host");
        let err = McpToolHost::spawn(config, None).await.err().unwrap();
        assert!(matches!(err, Error::Connection(_)));
    }
}
