//! Client side of the connection: spawn a host, talk to it, shut it down.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, InitializeParams,
    InitializeResult, JsonRpcRequest, JsonRpcResponse, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, Prompt, ReadResourceParams,
    ReadResourceResult, RequestId, Resource, ResourceTemplate, Tool,
};

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum size of a single protocol line (1MB).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How long a host gets to exit on its own after stdin closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Read side of the connection.
///
/// `line` outlives a cancelled read so a half-received line is finished by
/// the next reader instead of being lost.
struct Reader {
    inner: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    line: Vec<u8>,
}

/// How to launch a tool host process.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Handle to a connected tool host.
///
/// Usually backed by a child process ([`Client::spawn`]), but any pair of
/// byte streams works ([`Client::connect`]).
pub struct Client {
    name: String,
    timeout: Duration,
    process: Option<Mutex<Child>>,
    stdin: Mutex<Writer>,
    stdout: Mutex<Reader>,
    /// Held for a whole request, write through matching reply.
    exchange: Mutex<()>,
    /// Set while a message is being written; stays set if the write is cut off.
    desynced: AtomicBool,
    next_id: AtomicI64,
    server_info: Mutex<Option<InitializeResult>>,
    tools: Mutex<Vec<Tool>>,
}

impl Client {
    /// Spawn a new host process and attach to its stdio.
    pub async fn spawn(config: ClientConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(|source| Error::Spawn {
            command: config.command.clone(),
            source,
        })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdout")))?;

        debug!(host = %config.name, command = %config.command, "spawned tool host");

        let mut client = Self::connect(config.name, stdout, stdin).with_timeout(config.timeout);
        client.process = Some(Mutex::new(process));
        Ok(client)
    }

    /// Attach to a host over an existing pair of streams.
    pub fn connect(
        name: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        let writer: Writer = Box::new(writer);
        Self {
            name: name.into(),
            timeout: DEFAULT_TIMEOUT,
            process: None,
            stdin: Mutex::new(writer),
            stdout: Mutex::new(Reader {
                inner: BufReader::new(reader),
                line: Vec::new(),
            }),
            exchange: Mutex::new(()),
            desynced: AtomicBool::new(false),
            next_id: AtomicI64::new(1),
            server_info: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the host name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the capability handshake and fetch the tool catalog.
    ///
    /// Must be called before any other operation.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = InitializeParams::default();
        let result: InitializeResult = self.request("initialize", Some(params)).await?;

        self.notify("notifications/initialized", None::<()>).await?;

        debug!(
            host = %self.name,
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "handshake complete"
        );
        *self.server_info.lock().await = Some(result.clone());

        if result.capabilities.tools.is_some() {
            self.refresh_tools().await?;
        }

        Ok(result)
    }

    /// Check if the handshake has completed.
    pub async fn is_initialized(&self) -> bool {
        self.server_info.lock().await.is_some()
    }

    /// Get server info (after initialization).
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().await.clone()
    }

    /// Refresh the list of available tools.
    pub async fn refresh_tools(&self) -> Result<Vec<Tool>> {
        let result: ListToolsResult = self.request("tools/list", None::<()>).await?;
        *self.tools.lock().await = result.tools.clone();
        Ok(result.tools)
    }

    /// Get the cached list of available tools.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Call a tool by name.
    ///
    /// A result flagged `isError` becomes [`Error::ToolCallFailed`].
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        self.ensure_initialized().await?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.joined_text()));
        }

        Ok(result)
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        self.ensure_initialized().await?;
        let result: ListResourcesResult = self.request("resources/list", None::<()>).await?;
        Ok(result.resources)
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        self.ensure_initialized().await?;
        let result: ListResourceTemplatesResult = self
            .request("resources/templates/list", None::<()>)
            .await?;
        Ok(result.resource_templates)
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        self.ensure_initialized().await?;
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.request("resources/read", Some(params)).await
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        self.ensure_initialized().await?;
        let result: ListPromptsResult = self.request("prompts/list", None::<()>).await?;
        Ok(result.prompts)
    }

    /// Render a prompt template.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult> {
        self.ensure_initialized().await?;
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.request("prompts/get", Some(params)).await
    }

    pub async fn ping(&self) -> Result<()> {
        let _: Value = self.request("ping", None::<()>).await?;
        Ok(())
    }

    /// Close the connection.
    ///
    /// Closing stdin lets a well-behaved host exit on its own; the process is
    /// killed if it is still alive after a short grace period.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            name,
            stdin,
            process,
            ..
        } = self;
        drop(stdin);

        if let Some(process) = process {
            let mut child = process.into_inner();
            match timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!(host = %name, %status, "tool host exited"),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_) => {
                    warn!(host = %name, "tool host did not exit, killing it");
                    child.kill().await?;
                }
            }
        }

        Ok(())
    }

    // --- Internal methods ---

    async fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized().await {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Send one request and wait for its reply.
    ///
    /// Replies to earlier requests that timed out are discarded on the way.
    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let _exchange = self.exchange.lock().await;

        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        trace!(host = %self.name, %method, ?id, "sending request");
        self.write_message(&request).await?;

        // Read response with timeout
        let response = timeout(self.timeout, self.read_response(&id))
            .await
            .map_err(|_| Error::Timeout)??;

        let result_value = response.into_result()?;
        let result: R = serde_json::from_value(result_value)?;

        Ok(result)
    }

    async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<()>
    where
        P: serde::Serialize,
    {
        let mut notification = JsonRpcRequest::notification(method);
        if let Some(p) = params {
            notification = notification.with_params(p);
        }
        let _exchange = self.exchange.lock().await;
        self.write_message(&notification).await
    }

    async fn write_message(&self, message: &JsonRpcRequest) -> Result<()> {
        if self.desynced.load(Ordering::SeqCst) {
            return Err(Error::Desynced);
        }

        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        self.desynced.store(true, Ordering::SeqCst);
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        self.desynced.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Read lines until the reply to `expected` arrives.
    ///
    /// Host notifications and stale replies (numeric ids below `expected`)
    /// are skipped.
    async fn read_response(&self, expected: &RequestId) -> Result<JsonRpcResponse> {
        let mut stdout = self.stdout.lock().await;
        let Reader { inner, line } = &mut *stdout;

        loop {
            if inner.read_until(b'\n', line).await? == 0 {
                return Err(Error::ServerExited);
            }
            let raw = std::mem::take(line);

            if raw.len() > MAX_OUTPUT_SIZE {
                return Err(Error::OutputTooLarge {
                    size: raw.len(),
                    max: MAX_OUTPUT_SIZE,
                });
            }

            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let value: Value = serde_json::from_slice(&raw)?;
            if value.get("method").is_some() && value.get("id").is_none() {
                trace!(host = %self.name, "ignoring host notification");
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(value)?;
            match (response.id.as_ref(), expected) {
                (Some(id), _) if id == expected => return Ok(response),
                (Some(RequestId::Number(got)), RequestId::Number(want)) if got < want => {
                    debug!(host = %self.name, id = got, "dropping reply to an abandoned request");
                }
                (got, _) => {
                    return Err(Error::InvalidResponse(format!(
                        "response ID mismatch: expected {expected:?}, got {got:?}"
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    #[test]
    fn client_config_builder() {
        let config = ClientConfig::new("desk", "deskmate")
            .args(["serve"])
            .env("RUST_LOG", "warn")
            .timeout(Duration::from_secs(3));
        assert_eq!(config.name, "desk");
        assert_eq!(config.args, vec!["serve".to_string()]);
        assert_eq!(config.env.get("RUST_LOG").map(String::as_str), Some("warn"));
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn calls_before_handshake_are_rejected() {
        let (client_io, _host_io) = duplex(1024);
        let (reader, writer) = tokio::io::split(client_io);
        let client = Client::connect("test", reader, writer);

        let err = client.call_tool("anything", None).await.unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[tokio::test]
    async fn skips_notifications_while_waiting() {
        let (client_io, host_io) = duplex(4096);
        let (reader, writer) = tokio::io::split(client_io);
        let client = Client::connect("test", reader, writer);

        let host = tokio::spawn(async move {
            let (host_read, mut host_write) = tokio::io::split(host_io);
            let mut lines = BufReader::new(host_read).lines();
            let request = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&request).unwrap();

            let note = json!({"jsonrpc": "2.0", "method": "notifications/message"});
            let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": {}});
            for message in [note, reply] {
                host_write
                    .write_all(format!("{message}\n").as_bytes())
                    .await
                    .unwrap();
            }
        });

        client.ping().await.unwrap();
        host.await.unwrap();
    }

    async fn reply(write: &mut (impl AsyncWrite + Unpin), id: &Value) {
        let message = json!({"jsonrpc": "2.0", "id": id, "result": {}});
        write
            .write_all(format!("{message}\n").as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn late_reply_is_dropped_after_timeout() {
        let (client_io, host_io) = duplex(4096);
        let (reader, writer) = tokio::io::split(client_io);
        let client =
            Client::connect("test", reader, writer).with_timeout(Duration::from_millis(50));

        let host = tokio::spawn(async move {
            let (host_read, mut host_write) = tokio::io::split(host_io);
            let mut lines = BufReader::new(host_read).lines();
            let mut ids = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                let request: Value = serde_json::from_str(&line).unwrap();
                ids.push(request["id"].clone());
                match ids.len() {
                    // Sit on the first reply until the client has moved on.
                    1 => continue,
                    2 => reply(&mut host_write, &ids[0]).await,
                    _ => {}
                }
                reply(&mut host_write, &ids[ids.len() - 1]).await;
            }
            ids.len()
        });

        assert!(matches!(client.ping().await, Err(Error::Timeout)));
        client.ping().await.unwrap();
        client.ping().await.unwrap();

        drop(client);
        assert_eq!(host.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn half_read_reply_is_finished_by_next_request() {
        let (client_io, host_io) = duplex(4096);
        let (reader, writer) = tokio::io::split(client_io);
        let client =
            Client::connect("test", reader, writer).with_timeout(Duration::from_millis(50));

        let host = tokio::spawn(async move {
            let (host_read, mut host_write) = tokio::io::split(host_io);
            let mut lines = BufReader::new(host_read).lines();

            let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap())
                .unwrap();
            let stale = json!({"jsonrpc": "2.0", "id": first["id"], "result": {}}).to_string();
            let (head, tail) = stale.split_at(stale.len() / 2);
            host_write.write_all(head.as_bytes()).await.unwrap();

            let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap())
                .unwrap();
            host_write
                .write_all(format!("{tail}\n").as_bytes())
                .await
                .unwrap();
            reply(&mut host_write, &second["id"]).await;
        });

        assert!(matches!(client.ping().await, Err(Error::Timeout)));
        client.ping().await.unwrap();
        host.await.unwrap();
    }

    #[tokio::test]
    async fn reply_from_the_future_is_rejected() {
        let (client_io, host_io) = duplex(4096);
        let (reader, writer) = tokio::io::split(client_io);
        let client = Client::connect("test", reader, writer);

        let host = tokio::spawn(async move {
            let (host_read, mut host_write) = tokio::io::split(host_io);
            let mut lines = BufReader::new(host_read).lines();
            lines.next_line().await.unwrap().unwrap();
            reply(&mut host_write, &json!(99)).await;
        });

        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
        host.await.unwrap();
    }

    #[tokio::test]
    async fn closed_stream_reports_exit() {
        let (client_io, host_io) = duplex(1024);
        let (reader, writer) = tokio::io::split(client_io);
        let client = Client::connect("test", reader, writer);
        drop(host_io);

        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, Error::ServerExited | Error::Io(_)));
    }
}
