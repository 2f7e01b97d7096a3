//! MCP transport layer.
//!
//! A [`TransportBinding`] knows how to open one channel to a server; the
//! channel itself is an [`McpTransport`]. Currently supported:
//! - **Stdio**: spawn a child process, send JSON-RPC over stdin/stdout.
//! - **Sse**: long-lived HTTP event stream for responses, POST for requests.
//!
//! Opening is a single attempt. Retry policy, if any, belongs to the caller.

pub mod sse;
pub mod stdio;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use mat_domain::config::McpTransportKind;

use crate::protocol::JsonRpcResponse;

pub use sse::{SseBinding, SseParams, SseTransport};
pub use stdio::{StdioBinding, StdioParams, StdioTransport};

/// An open, bidirectional JSON-RPC channel to one server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the corresponding response.
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError>;

    /// Send a JSON-RPC notification (no response expected).
    async fn send_notification(&self, method: &str) -> Result<(), TransportError>;

    /// Check if the transport is still alive.
    fn is_alive(&self) -> bool;

    /// Release the channel. Safe to call more than once and after a
    /// partially failed open.
    async fn shutdown(&self);
}

/// Something that can open an [`McpTransport`].
#[async_trait]
pub trait TransportBinding: Send + Sync {
    fn kind(&self) -> McpTransportKind;

    /// Human-readable target for logs (command line or URL).
    fn target(&self) -> String;

    /// Open a channel. Any resource acquired before a failure is released
    /// before the error is returned.
    async fn open(&self) -> Result<Arc<dyn McpTransport>, TransportError>;
}

/// Validated, immutable parameters for one of the supported transports.
#[derive(Debug, Clone)]
pub enum ConnectionParams {
    Stdio(StdioParams),
    Sse(SseParams),
}

impl ConnectionParams {
    pub fn kind(&self) -> McpTransportKind {
        match self {
            Self::Stdio(_) => McpTransportKind::Stdio,
            Self::Sse(_) => McpTransportKind::Sse,
        }
    }

    /// Turn the parameters into the binding that opens them.
    pub fn into_binding(self) -> Box<dyn TransportBinding> {
        match self {
            Self::Stdio(params) => Box::new(StdioBinding::new(params)),
            Self::Sse(params) => Box::new(SseBinding::new(params)),
        }
    }
}

impl From<StdioParams> for ConnectionParams {
    fn from(params: StdioParams) -> Self {
        Self::Stdio(params)
    }
}

impl From<SseParams> for ConnectionParams {
    fn from(params: SseParams) -> Self {
        Self::Sse(params)
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("transport channel is closed")]
    Closed,
}
