//! `mat-mcp-client`: connection management for MCP (Model Context Protocol)
//! tool servers.
//!
//! This crate provides:
//! - JSON-RPC 2.0 / MCP protocol types.
//! - Transport bindings: a stdio child process, or HTTP + SSE.
//! - Auth middleware (HMAC request signing, HS256 JWT) applied as an
//!   ordered pipeline of header transforms.
//! - [`McpServer`], which owns the lifecycle of one connection and caches
//!   its tool list.
//! - [`McpClientWithAuth`], an authenticated SSE client in one constructor.
//! - [`McpManager`], which drives several servers from a config file.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mat_mcp_client::{McpServer, StdioParams, ToolCall};
//!
//! let params = StdioParams::new("docker")?.with_args(["run", "-i", "--rm", "mcp/fetch"]);
//! let mut server = McpServer::stdio("fetch", params);
//!
//! server.connect().await?;
//! for tool in server.list_tools().await? {
//!     println!("{}: {}", tool.name, tool.description);
//! }
//! let result = server
//!     .call_tool(ToolCall::with_arguments("fetch", json!({ "url": "https://example.com" }))?)
//!     .await?;
//! server.disconnect().await;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod request;
pub mod server;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-exports for convenience.
pub use auth::{create_auth_middleware, AuthScheme, HeaderPipeline, HeaderTransform};
pub use client::McpClientWithAuth;
pub use config::{McpConfig, McpServerConfig, McpTransportKind};
pub use error::McpError;
pub use manager::McpManager;
pub use protocol::{McpPromptDef, McpToolDef, RemoteToolError, ToolCallResult};
pub use request::ToolCall;
pub use server::{ConnectionState, McpServer};
pub use transport::{ConnectionParams, SseParams, StdioParams, TransportError};
