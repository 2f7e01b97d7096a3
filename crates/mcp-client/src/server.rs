//! Server session manager: one logical connection to one MCP server.
//!
//! ```text
//!               connect() ok
//!  Disconnected ─────────────▶ Connected
//!       ▲  │ connect() err         │
//!       │  └──────┘                │ disconnect()
//!       └──────────────────────────┘
//! ```
//!
//! Queries made while disconnected fail with [`McpError::NotConnected`]
//! before any I/O happens. Methods that change state take `&mut self`, so
//! callers serialize operations on one server by construction.

use std::sync::Arc;

use tracing::Instrument;

use crate::config::{self, McpServerConfig, McpTransportKind};
use crate::error::McpError;
use crate::protocol::{InitializeResult, McpPromptDef, McpToolDef, ToolCallResult};
use crate::request::ToolCall;
use crate::session::McpSession;
use crate::transport::{
    ConnectionParams, McpTransport, SseParams, StdioParams, TransportBinding,
};

/// Lifecycle state of an [`McpServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// The live session handle: protocol session plus the channel it runs on.
/// Released in reverse order of acquisition.
struct Connection {
    session: McpSession,
    transport: Arc<dyn McpTransport>,
}

/// A connection manager for a single MCP server.
pub struct McpServer {
    name: String,
    binding: Box<dyn TransportBinding>,
    connection: Option<Connection>,
    /// `tools/list` result for the current connection. Cleared by
    /// `disconnect` and `invalidate_tools_cache`.
    tools_cache: Option<Vec<McpToolDef>>,
    cache_tools_list: bool,
    span: tracing::Span,
}

impl McpServer {
    /// Manager over an arbitrary binding. Tool-list caching is on.
    pub fn new(name: impl Into<String>, binding: Box<dyn TransportBinding>) -> Self {
        let name = name.into();
        let span = tracing::info_span!("mcp_server", server = %name);
        Self {
            name,
            binding,
            connection: None,
            tools_cache: None,
            cache_tools_list: true,
            span,
        }
    }

    pub fn from_params(name: impl Into<String>, params: impl Into<ConnectionParams>) -> Self {
        Self::new(name, params.into().into_binding())
    }

    /// Server reached by spawning a child process.
    pub fn stdio(name: impl Into<String>, params: StdioParams) -> Self {
        Self::from_params(name, params)
    }

    /// Server reached over HTTP + SSE.
    pub fn sse(name: impl Into<String>, params: SseParams) -> Self {
        Self::from_params(name, params)
    }

    /// Server described by one `[[servers]]` config entry. Fails with
    /// [`McpError::Configuration`] on an invalid entry.
    pub fn from_config(cfg: &McpServerConfig) -> Result<Self, McpError> {
        let params = config::connection_params(cfg)?;
        Ok(Self::from_params(cfg.display_name(), params).with_tool_cache(cfg.cache_tools_list))
    }

    /// Enable or disable per-connection caching of `tools/list`.
    pub fn with_tool_cache(mut self, enabled: bool) -> Self {
        self.cache_tools_list = enabled;
        self
    }

    /// Record this server's events under `span` instead of the default
    /// `mcp_server{server=<name>}` span.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport_kind(&self) -> McpTransportKind {
        self.binding.kind()
    }

    pub fn state(&self) -> ConnectionState {
        if self.connection.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether the underlying channel is still usable. `false` when
    /// disconnected, or when the server went away since `connect`.
    pub fn is_alive(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.transport.is_alive())
    }

    /// What the server reported during the handshake.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.connection.as_ref().and_then(|c| c.session.server_info())
    }

    /// Open the transport and perform the MCP handshake.
    ///
    /// A single attempt. On failure everything acquired so far is released
    /// and the server stays disconnected. Calling this while connected is a
    /// no-op.
    pub async fn connect(&mut self) -> Result<(), McpError> {
        let span = self.span.clone();
        self.connect_inner().instrument(span).await
    }

    async fn connect_inner(&mut self) -> Result<(), McpError> {
        if self.connection.is_some() {
            tracing::debug!("already connected to MCP server");
            return Ok(());
        }

        tracing::info!(
            transport = ?self.binding.kind(),
            target = %self.binding.target(),
            "connecting to MCP server"
        );

        let transport = match self.binding.open().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open MCP transport");
                return Err(McpError::connection(&self.name, e));
            }
        };

        let mut session = McpSession::new(Arc::clone(&transport));
        if let Err(e) = session.initialize().await {
            tracing::warn!(error = %e, "MCP handshake failed, releasing transport");
            session.close();
            transport.shutdown().await;
            return Err(McpError::connection(&self.name, e));
        }

        if let Some(info) = session.server_info().and_then(|i| i.server_info.as_ref()) {
            tracing::info!(
                remote = %info.name,
                remote_version = %info.version,
                "connected to MCP server"
            );
        } else {
            tracing::info!("connected to MCP server");
        }

        self.tools_cache = None;
        self.connection = Some(Connection { session, transport });
        Ok(())
    }

    /// Release the session, then the transport. A no-op when already
    /// disconnected.
    pub async fn disconnect(&mut self) {
        let Some(Connection { session, transport }) = self.connection.take() else {
            return;
        };
        self.tools_cache = None;

        async move {
            session.close();
            transport.shutdown().await;
            tracing::info!("disconnected from MCP server");
        }
        .instrument(self.span.clone())
        .await
    }

    /// Tools offered by the server, fetched once per connection when
    /// caching is enabled.
    pub async fn list_tools(&mut self) -> Result<Vec<McpToolDef>, McpError> {
        let span = self.span.clone();
        self.list_tools_inner().instrument(span).await
    }

    async fn list_tools_inner(&mut self) -> Result<Vec<McpToolDef>, McpError> {
        let session = self.session()?;
        if self.cache_tools_list {
            if let Some(tools) = &self.tools_cache {
                tracing::debug!(tool_count = tools.len(), "returning cached tools");
                return Ok(tools.clone());
            }
        }

        let tools = session.list_tools().await?;
        tracing::info!(tool_count = tools.len(), "fetched tool list");

        if self.cache_tools_list {
            self.tools_cache = Some(tools.clone());
        }
        Ok(tools)
    }

    /// Drop the cached tool list; the next `list_tools` asks the server.
    pub fn invalidate_tools_cache(&mut self) {
        self.tools_cache = None;
    }

    /// Prompts offered by the server. Never cached.
    pub async fn list_prompts(&self) -> Result<Vec<McpPromptDef>, McpError> {
        let session = self.session()?;
        let prompts = session
            .list_prompts()
            .instrument(self.span.clone())
            .await?;
        tracing::debug!(parent: &self.span, prompt_count = prompts.len(), "fetched prompt list");
        Ok(prompts)
    }

    /// Invoke a tool. Failures reported by the tool itself come back as
    /// `Ok` with [`ToolCallResult::is_error`] set.
    pub async fn call_tool(&self, call: ToolCall) -> Result<ToolCallResult, McpError> {
        let session = self.session()?;
        tracing::info!(parent: &self.span, tool = call.tool_name(), "calling MCP tool");
        let result = session
            .call_tool(&call)
            .instrument(self.span.clone())
            .await?;
        if result.is_error {
            tracing::debug!(parent: &self.span, tool = call.tool_name(), "MCP tool reported an error");
        }
        Ok(result)
    }

    fn session(&self) -> Result<&McpSession, McpError> {
        self.connection
            .as_ref()
            .map(|c| &c.session)
            .ok_or_else(|| McpError::NotConnected(self.name.clone()))
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("name", &self.name)
            .field("transport", &self.binding.kind())
            .field("target", &self.binding.target())
            .field("state", &self.state())
            .field("cache_tools_list", &self.cache_tools_list)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::testing::{Log, MockBinding};

    fn mock_server(binding: MockBinding) -> (McpServer, Arc<Log>) {
        let log = Arc::clone(&binding.log);
        (McpServer::new("mock", Box::new(binding)), log)
    }

    #[tokio::test]
    async fn queries_while_disconnected_fail_without_io() {
        let (mut server, log) = mock_server(MockBinding::default());
        assert_eq!(server.state(), ConnectionState::Disconnected);

        assert!(matches!(server.list_tools().await, Err(McpError::NotConnected(ref n)) if n == "mock"));
        assert!(matches!(server.list_prompts().await, Err(McpError::NotConnected(_))));
        let call = ToolCall::new("echo").unwrap();
        assert!(matches!(server.call_tool(call).await, Err(McpError::NotConnected(_))));

        assert!(log.events().is_empty());
    }

    #[tokio::test]
    async fn connect_performs_handshake() {
        let (mut server, log) = mock_server(MockBinding::default());
        server.connect().await.unwrap();

        assert_eq!(server.state(), ConnectionState::Connected);
        assert!(server.is_alive());
        assert_eq!(log.events(), vec!["open", "initialize", "notifications/initialized"]);
        let info = server.server_info().unwrap();
        assert_eq!(info.server_info.as_ref().unwrap().name, "mock");
    }

    #[tokio::test]
    async fn connect_while_connected_is_a_noop() {
        let (mut server, log) = mock_server(MockBinding::default());
        server.connect().await.unwrap();
        server.connect().await.unwrap();
        assert_eq!(log.count("open"), 1);
    }

    #[tokio::test]
    async fn list_tools_is_cached_per_connection() {
        let (mut server, log) = mock_server(MockBinding::default());
        server.connect().await.unwrap();

        let first = server.list_tools().await.unwrap();
        let second = server.list_tools().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["echo", "fail"]);
        assert_eq!(log.count("tools/list"), 1);

        server.disconnect().await;
        server.connect().await.unwrap();
        server.list_tools().await.unwrap();
        assert_eq!(log.count("tools/list"), 2);
    }

    #[tokio::test]
    async fn disabled_cache_always_fetches() {
        let (server, log) = mock_server(MockBinding::default());
        let mut server = server.with_tool_cache(false);
        server.connect().await.unwrap();

        server.list_tools().await.unwrap();
        server.list_tools().await.unwrap();
        assert_eq!(log.count("tools/list"), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let (mut server, log) = mock_server(MockBinding::default());
        server.connect().await.unwrap();

        server.list_tools().await.unwrap();
        server.invalidate_tools_cache();
        server.list_tools().await.unwrap();
        assert_eq!(log.count("tools/list"), 2);
    }

    #[tokio::test]
    async fn list_prompts_is_always_live() {
        let (mut server, log) = mock_server(MockBinding::default());
        server.connect().await.unwrap();

        let prompts = server.list_prompts().await.unwrap();
        server.list_prompts().await.unwrap();
        assert_eq!(prompts[0].name, "greet");
        assert_eq!(log.count("prompts/list"), 2);
    }

    #[tokio::test]
    async fn disconnect_releases_transport_and_is_idempotent() {
        let (mut server, log) = mock_server(MockBinding::default());
        server.disconnect().await;
        assert!(log.events().is_empty());

        server.connect().await.unwrap();
        server.disconnect().await;
        server.disconnect().await;

        assert_eq!(server.state(), ConnectionState::Disconnected);
        assert!(server.server_info().is_none());
        assert!(!server.is_alive());
        assert_eq!(log.count("shutdown"), 1);
    }

    #[tokio::test]
    async fn rejected_handshake_releases_transport() {
        let (mut server, log) = mock_server(MockBinding {
            reject_handshake: true,
            ..Default::default()
        });

        let err = server.connect().await.unwrap_err();
        assert!(matches!(err, McpError::Connection { ref server, .. } if server == "mock"));
        assert!(err.to_string().contains("handshake rejected"));
        assert_eq!(server.state(), ConnectionState::Disconnected);
        assert_eq!(log.events(), vec!["open", "initialize", "shutdown"]);

        // Disconnect after a failed connect has nothing left to release.
        server.disconnect().await;
        assert_eq!(log.count("shutdown"), 1);
    }

    #[tokio::test]
    async fn failed_open_is_a_connection_error() {
        let (mut server, log) = mock_server(MockBinding {
            fail_open: true,
            ..Default::default()
        });

        let err = server.connect().await.unwrap_err();
        assert!(matches!(err, McpError::Connection { .. }));
        assert!(!server.is_connected());
        assert_eq!(log.events(), vec!["open"]);
    }

    #[tokio::test]
    async fn call_tool_sends_empty_object_by_default() {
        let (mut server, _log) = mock_server(MockBinding::default());
        server.connect().await.unwrap();

        let result = server.call_tool(ToolCall::new("echo").unwrap()).await.unwrap();
        assert_eq!(result.text(), "{}");

        let call = ToolCall::with_arguments("echo", json!({ "msg": "hi" })).unwrap();
        let result = server.call_tool(call).await.unwrap();
        assert_eq!(result.text(), r#"{"msg":"hi"}"#);
    }

    #[tokio::test]
    async fn remote_tool_failure_is_a_result_not_an_error() {
        let (mut server, _log) = mock_server(MockBinding::default());
        server.connect().await.unwrap();

        let result = server.call_tool(ToolCall::new("fail").unwrap()).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.remote_error().unwrap().message, "boom");
    }
}
