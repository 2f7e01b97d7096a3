//! Errors surfaced by the MCP client.

use crate::transport::TransportError;

/// Errors specific to MCP operations.
///
/// A tool that runs and reports failure is *not* an error here: it comes
/// back as `Ok(ToolCallResult)` with `is_error` set (see
/// [`ToolCallResult::remote_error`](crate::protocol::ToolCallResult::remote_error)).
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Invalid or unsupported construction input (auth scheme, URL, command,
    /// tool call). Never produced by an in-flight operation.
    #[error("MCP configuration error: {0}")]
    Configuration(String),

    /// The transport could not be opened or the handshake failed.
    #[error("MCP connection to {server} failed: {reason}")]
    Connection { server: String, reason: String },

    /// A query was attempted while the server is disconnected.
    #[error("MCP server {0} is not connected")]
    NotConnected(String),

    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),
}

impl McpError {
    pub(crate) fn connection(server: &str, reason: impl std::fmt::Display) -> Self {
        Self::Connection {
            server: server.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<McpError> for mat_domain::Error {
    fn from(e: McpError) -> Self {
        match e {
            McpError::Configuration(msg) => mat_domain::Error::Config(msg),
            other => mat_domain::Error::Other(other.to_string()),
        }
    }
}
