//! Authenticated SSE client: one constructor that picks the auth middleware,
//! wires it into an SSE binding and hands back a ready-to-connect server.

use std::collections::HashMap;

use crate::auth::{client_auth_middleware, AuthScheme};
use crate::error::McpError;
use crate::protocol::{InitializeResult, McpPromptDef, McpToolDef, ToolCallResult};
use crate::request::ToolCall;
use crate::server::{ConnectionState, McpServer};
use crate::transport::SseParams;

/// An [`McpServer`] over SSE whose every HTTP request is authenticated.
///
/// Construction validates the URL and auth scheme but performs no I/O.
/// Tool-list caching is enabled.
#[derive(Debug)]
pub struct McpClientWithAuth {
    server: McpServer,
    scheme: AuthScheme,
}

impl McpClientWithAuth {
    /// `auth_type` is `"secret_key"` (HMAC request signing) or `"jwt"`
    /// (bearer token, issued under `name`).
    pub fn new(
        url: &str,
        auth_type: &str,
        secret_key: &str,
        headers: HashMap<String, String>,
        name: impl Into<String>,
    ) -> Result<Self, McpError> {
        let name = name.into();
        let scheme: AuthScheme = auth_type.parse()?;

        let middleware = client_auth_middleware(scheme, secret_key, &name)?;

        let params = SseParams::new(url)?
            .with_headers(headers)
            .with_middleware(middleware);

        tracing::debug!(server = %name, auth = %scheme, url = %params.url(), "built authenticated MCP client");

        Ok(Self {
            server: McpServer::sse(name, params).with_tool_cache(true),
            scheme,
        })
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        self.scheme
    }

    pub fn name(&self) -> &str {
        self.server.name()
    }

    pub fn state(&self) -> ConnectionState {
        self.server.state()
    }

    pub fn is_connected(&self) -> bool {
        self.server.is_connected()
    }

    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server.server_info()
    }

    pub async fn connect(&mut self) -> Result<(), McpError> {
        self.server.connect().await
    }

    pub async fn disconnect(&mut self) {
        self.server.disconnect().await
    }

    pub async fn list_tools(&mut self) -> Result<Vec<McpToolDef>, McpError> {
        self.server.list_tools().await
    }

    pub async fn list_prompts(&self) -> Result<Vec<McpPromptDef>, McpError> {
        self.server.list_prompts().await
    }

    pub async fn call_tool(&self, call: ToolCall) -> Result<ToolCallResult, McpError> {
        self.server.call_tool(call).await
    }

    pub fn server(&self) -> &McpServer {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut McpServer {
        &mut self.server
    }

    pub fn into_server(self) -> McpServer {
        self.server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mat_domain::config::McpTransportKind;

    fn build(auth_type: &str, secret: &str) -> Result<McpClientWithAuth, McpError> {
        McpClientWithAuth::new(
            "http://127.0.0.1:9/sse",
            auth_type,
            secret,
            HashMap::from([("X-Tenant".to_string(), "acme".to_string())]),
            "remote",
        )
    }

    #[test]
    fn unsupported_auth_type_is_rejected() {
        let err = build("basic", "s3cret").unwrap_err();
        assert!(matches!(err, McpError::Configuration(ref m) if m.contains("basic")));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(build("jwt", ""), Err(McpError::Configuration(_))));
        assert!(matches!(build("secret_key", ""), Err(McpError::Configuration(_))));
    }

    #[test]
    fn non_http_url_is_rejected() {
        let err = McpClientWithAuth::new("ftp://host/sse", "jwt", "k", HashMap::new(), "x").unwrap_err();
        assert!(matches!(err, McpError::Configuration(_)));
    }

    #[test]
    fn construction_does_no_io() {
        // Port 9 (discard) is almost never listening; construction must not care.
        let client = build("secret_key", "s3cret").unwrap();
        assert_eq!(client.auth_scheme(), AuthScheme::SecretKey);
        assert_eq!(client.name(), "remote");
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.server().transport_kind(), McpTransportKind::Sse);
    }

    #[tokio::test]
    async fn queries_before_connect_fail() {
        let mut client = build("jwt", "s3cret").unwrap();
        assert!(matches!(client.list_tools().await, Err(McpError::NotConnected(_))));
        client.disconnect().await;
        assert!(!client.is_connected());
    }
}
