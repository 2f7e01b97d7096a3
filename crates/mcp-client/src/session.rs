//! Protocol session over an open transport: the `initialize` handshake and
//! the typed `tools/*` and `prompts/*` requests.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::McpError;
use crate::protocol::{
    self, InitializeResult, McpPromptDef, McpToolDef, PromptsListResult, ToolCallResult,
    ToolsListResult,
};
use crate::request::ToolCall;
use crate::transport::McpTransport;

/// Upper bound on pages followed for one list request, so a server that
/// keeps returning a cursor cannot loop the client forever.
const MAX_LIST_PAGES: usize = 100;

/// A negotiated MCP session. Holds a shared handle to the transport; the
/// owner of the connection is responsible for shutting the transport down
/// after the session is closed.
pub struct McpSession {
    transport: Arc<dyn McpTransport>,
    server_info: Option<InitializeResult>,
}

impl McpSession {
    pub fn new(transport: Arc<dyn McpTransport>) -> Self {
        Self {
            transport,
            server_info: None,
        }
    }

    /// Perform the handshake: `initialize` followed by the
    /// `notifications/initialized` notification.
    pub async fn initialize(&mut self) -> Result<&InitializeResult, McpError> {
        let params = serde_json::to_value(protocol::initialize_params())
            .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

        let result: InitializeResult = self.request("initialize", Some(params)).await?;
        if result.protocol_version != protocol::PROTOCOL_VERSION {
            tracing::warn!(
                expected = protocol::PROTOCOL_VERSION,
                got = %result.protocol_version,
                "MCP protocol version mismatch"
            );
        }
        tracing::debug!("MCP initialize response received");

        self.transport
            .send_notification("notifications/initialized")
            .await?;
        tracing::debug!("sent notifications/initialized");

        Ok(&*self.server_info.insert(result))
    }

    /// Result of the handshake, once [`initialize`](Self::initialize) succeeded.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// `tools/list`, following `nextCursor` until exhausted.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let page: ToolsListResult = self
                .request("tools/list", protocol::cursor_params(cursor.as_deref()))
                .await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
        Err(McpError::Protocol(format!(
            "tools/list did not finish within {MAX_LIST_PAGES} pages"
        )))
    }

    /// `prompts/list`, following `nextCursor` until exhausted.
    pub async fn list_prompts(&self) -> Result<Vec<McpPromptDef>, McpError> {
        let mut prompts = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let page: PromptsListResult = self
                .request("prompts/list", protocol::cursor_params(cursor.as_deref()))
                .await?;
            prompts.extend(page.prompts);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(prompts),
            }
        }
        Err(McpError::Protocol(format!(
            "prompts/list did not finish within {MAX_LIST_PAGES} pages"
        )))
    }

    /// `tools/call`. A tool that reports failure still yields `Ok`, with
    /// `is_error` set on the result.
    pub async fn call_tool(&self, call: &ToolCall) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": call.tool_name(),
            "arguments": call.arguments(),
        });
        self.request("tools/call", Some(params)).await
    }

    /// End the protocol session. The transport is left open for its owner
    /// to release.
    pub fn close(self) {
        tracing::debug!("MCP session closed");
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, McpError> {
        let resp = self.transport.send_request(method, params).await?;
        let value = resp
            .into_result()
            .map_err(|err| McpError::Protocol(format!("{method} failed: {err}")))?;
        serde_json::from_value(value)
            .map_err(|e| McpError::Protocol(format!("failed to parse {method} result: {e}")))
    }
}
