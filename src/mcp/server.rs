//! MCP server loop.
//!
//! The server reads one line, handles it completely (including any backend
//! call) and writes at most one reply before reading the next. It holds no
//! session state: `tools/list` and `tools/call` are accepted without a prior
//! `initialize`.
//!
//! Requests always get exactly one reply, with `id` left out when the request
//! carried none. Notifications never do. A line that cannot be decoded is
//! answered with a parse error and the loop keeps reading.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::mcp::protocol::{
    is_notification_method, parse_message, IncomingMessage, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::tools::{tool_definitions, ToolDispatcher};
use crate::mcp::transport::{Line, LineTransport};

/// Server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Accepting messages.
    Running,
    /// Input ended or a shutdown signal arrived.
    Stopped,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Map<String, Value>>,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call failed.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

/// The single reply a line produces.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A `result` reply.
    Response(JsonRpcResponse),
    /// An `error` reply.
    Error(JsonRpcError),
}

/// The MCP server.
pub struct McpServer<R, W> {
    state: ServerState,
    transport: LineTransport<R, W>,
    tools: ToolDispatcher,
}

impl<R, W> McpServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server that dispatches tool calls to `tools`.
    pub const fn new(transport: LineTransport<R, W>, tools: ToolDispatcher) -> Self {
        Self {
            state: ServerState::Running,
            transport,
            tools,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Consumes the server, returning its transport.
    pub fn into_transport(self) -> LineTransport<R, W> {
        self.transport
    }

    /// Serves requests until the input ends.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> io::Result<()> {
        while self.state == ServerState::Running {
            let line = self.transport.read_line().await;
            self.handle_transport_result(line).await?;
        }
        Ok(())
    }

    /// Serves requests until the input ends or a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(unix)]
    pub async fn run_until_shutdown(&mut self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(io::Error::other)?;

        while self.state == ServerState::Running {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, shutting down");
                    self.state = ServerState::Stopped;
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down");
                    self.state = ServerState::Stopped;
                }

                line = self.transport.read_line() => {
                    self.handle_transport_result(line).await?;
                }
            }
        }
        Ok(())
    }

    /// Serves requests until the input ends or a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(windows)]
    pub async fn run_until_shutdown(&mut self) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        while self.state == ServerState::Running {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, shutting down");
                    self.state = ServerState::Stopped;
                }

                line = self.transport.read_line() => {
                    self.handle_transport_result(line).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_transport_result(&mut self, line: io::Result<Option<Line>>) -> io::Result<()> {
        let line = match line? {
            None => {
                tracing::info!("Input closed, stopping");
                self.state = ServerState::Stopped;
                return Ok(());
            }
            Some(Line::Malformed(detail)) => {
                tracing::warn!(%detail, "Input line is not UTF-8");
                return self.transport.write_error(&JsonRpcError::parse_error(detail)).await;
            }
            Some(Line::Text(line)) => line,
        };

        if line.trim().is_empty() {
            return Ok(());
        }

        let reply = self.handle_line(&line).await;
        match reply {
            Some(Reply::Response(response)) => self.transport.write_response(&response).await,
            Some(Reply::Error(error)) => self.transport.write_error(&error).await,
            None => Ok(()),
        }
    }

    /// Handles one input line, returning the reply to write if any.
    pub async fn handle_line(&self, line: &str) -> Option<Reply> {
        match parse_message(line) {
            Ok(message) => self.handle_message(message).await,
            Err(error) => {
                tracing::warn!(data = ?error.error.data, "Unparseable message");
                Some(Reply::Error(error))
            }
        }
    }

    async fn handle_message(&self, message: IncomingMessage) -> Option<Reply> {
        match message {
            IncomingMessage::Request(req) => Some(self.handle_request(req).await),
            IncomingMessage::Notification(notif) => {
                tracing::debug!(method = %notif.method, "Notification");
                None
            }
        }
    }

    async fn handle_request(&self, req: JsonRpcRequest) -> Reply {
        tracing::debug!(id = ?req.id, method = %req.method, "Request");
        let response = match req.method.as_str() {
            "initialize" => Ok(Self::handle_initialize(&req)),
            "tools/list" => Ok(self.handle_tools_list(&req)),
            "tools/call" => self.handle_tools_call(&req).await,
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            // Sent with an id, so it still needs an answer.
            m if is_notification_method(m) => {
                Ok(JsonRpcResponse::success(req.id.clone(), json!({})))
            }
            _ => Err(JsonRpcError::method_not_found(req.id.clone())),
        };

        match response {
            Ok(resp) => Reply::Response(resp),
            Err(error) => Reply::Error(error),
        }
    }

    fn handle_initialize(req: &JsonRpcRequest) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities {
                tools: ToolCapabilities::default(),
            },
            "serverInfo": ServerInfo::default(),
        });
        JsonRpcResponse::success(req.id.clone(), result)
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let tools = tool_definitions(self.tools.manifest());
        JsonRpcResponse::success(req.id.clone(), json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: ToolCallParams = serde_json::from_value(req.params.clone().unwrap_or(Value::Null))
            .map_err(|e| JsonRpcError::invalid_params(req.id.clone(), e.to_string()))?;

        let result = match self.tools.call(&params.name, params.arguments.as_ref()).await {
            Ok(text) => ToolCallResult::text(text),
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "Tool call failed");
                ToolCallResult::error(e.to_string())
            }
        };

        // ToolCallResult holds only strings and a bool.
        let value = serde_json::to_value(&result).unwrap_or(Value::Null);
        Ok(JsonRpcResponse::success(req.id.clone(), value))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::testing::ScriptedClient;
    use crate::api::ApiClient;
    use crate::manifest::loader::parse_manifest;
    use crate::mcp::protocol::RequestId;
    use crate::request::RuntimeContext;

    const MANIFEST: &str = r"
version: '1'
commands:
  - command: clusters/list
    endpoint: /v1/accounts/:aid/clusters
    method: GET
";

    type TestServer = McpServer<&'static [u8], Vec<u8>>;

    fn server(input: &'static [u8], client: &Arc<ScriptedClient>) -> TestServer {
        let manifest = Arc::new(parse_manifest(MANIFEST).unwrap());
        let ctx = RuntimeContext::new("http://api").with_account_id(Some("a1".to_string()));
        let tools = ToolDispatcher::new(manifest, Arc::clone(client) as Arc<dyn ApiClient>, ctx);
        McpServer::new(LineTransport::new(input, Vec::new()), tools)
    }

    fn replies(server: TestServer) -> Vec<Value> {
        let written = String::from_utf8(server.into_transport().into_writer()).unwrap();
        written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn initialize_advertises_tools() {
        let client = Arc::new(ScriptedClient::default());
        let s = server(b"", &client);
        let Some(Reply::Response(resp)) = s
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
        else {
            panic!("expected a result");
        };
        assert_eq!(resp.id, Some(RequestId::Number(1)));
        assert_eq!(
            resp.result,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "runos", "version": env!("CARGO_PKG_VERSION")}
            })
        );
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let client = Arc::new(ScriptedClient::default());
        let s = server(b"", &client);
        for line in [
            r#"{"jsonrpc":"2.0","method":"initialized"}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{}}"#,
        ] {
            assert!(s.handle_line(line).await.is_none(), "{line}");
        }
    }

    #[tokio::test]
    async fn requests_without_id_are_answered_without_id() {
        let client = Arc::new(ScriptedClient::default());
        let s = server(b"", &client);

        let Some(Reply::Response(resp)) = s.handle_line(r#"{"jsonrpc":"2.0","method":"ping"}"#).await
        else {
            panic!("expected a result");
        };
        assert_eq!(resp.id, None);
        assert_eq!(resp.result, json!({}));

        let Some(Reply::Error(err)) = s.handle_line(r#"{"jsonrpc":"2.0","method":"bogus"}"#).await
        else {
            panic!("expected an error");
        };
        assert_eq!(err.error.code, -32601);
        assert_eq!(err.id, None);

        let Some(Reply::Response(resp)) =
            s.handle_line(r#"{"jsonrpc":"2.0","method":"tools/list"}"#).await
        else {
            panic!("expected a result");
        };
        assert_eq!(resp.result["tools"][0]["name"], "api_request");
    }

    #[tokio::test]
    async fn initialized_with_id_is_acknowledged() {
        let client = Arc::new(ScriptedClient::default());
        let s = server(b"", &client);
        let Some(Reply::Response(resp)) = s
            .handle_line(r#"{"jsonrpc":"2.0","id":9,"method":"initialized"}"#)
            .await
        else {
            panic!("expected a result");
        };
        assert_eq!(resp.id, Some(RequestId::Number(9)));
    }

    #[tokio::test]
    async fn non_utf8_line_gets_parse_error_and_server_continues() {
        let client = Arc::new(ScriptedClient::default());
        let input: &'static [u8] =
            b"\xff\xfe garbage\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
        let mut s = server(input, &client);
        s.run().await.unwrap();
        assert_eq!(s.state(), ServerState::Stopped);

        let out = replies(s);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["error"]["code"], -32700);
        assert!(out[0].get("id").is_none());
        assert_eq!(out[1], json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
    }

    #[tokio::test]
    async fn unknown_method() {
        let client = Arc::new(ScriptedClient::default());
        let s = server(b"", &client);
        let Some(Reply::Error(err)) = s
            .handle_line(r#"{"jsonrpc":"2.0","id":"x","method":"resources/list"}"#)
            .await
        else {
            panic!("expected an error");
        };
        assert_eq!(err.error.code, -32601);
        assert_eq!(err.id, Some(RequestId::String("x".to_string())));
    }

    #[tokio::test]
    async fn malformed_call_params() {
        let client = Arc::new(ScriptedClient::default());
        let s = server(b"", &client);
        for line in [
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"arguments":{}}}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"x","arguments":[1]}}"#,
        ] {
            let Some(Reply::Error(err)) = s.handle_line(line).await else {
                panic!("expected an error for {line}");
            };
            assert_eq!(err.error.code, -32602);
        }
    }

    #[tokio::test]
    async fn tool_failure_is_a_result() {
        let client = Arc::new(ScriptedClient::default());
        let s = server(b"", &client);
        let Some(Reply::Response(resp)) = s
            .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"nope"}}"#)
            .await
        else {
            panic!("expected a result");
        };
        assert_eq!(resp.result["isError"], true);
        assert!(resp.result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("unknown command"));
    }

    #[tokio::test]
    async fn run_serves_until_eof() {
        let client = Arc::new(ScriptedClient::new([(200, r#"[{"id":"k1"}]"#)]));
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "\n",
            "{broken\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"initialized\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",",
            "\"params\":{\"name\":\"clusters_list\",\"arguments\":{}}}\n",
        );
        let mut s = server(input.as_bytes(), &client);
        s.run().await.unwrap();
        assert_eq!(s.state(), ServerState::Stopped);

        let out = replies(s);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        assert_eq!(out[1]["error"]["code"], -32700);
        assert!(out[1].get("id").is_none());
        assert_eq!(out[2]["id"], 2);
        assert!(out[2]["result"].get("isError").is_none());
        assert!(out[2]["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("\"k1\""));

        assert_eq!(client.requests()[0].url, "http://api/v1/accounts/a1/clusters");
    }
}
