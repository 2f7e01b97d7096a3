//! MCP (Model Context Protocol) server configuration types.
//!
//! These structs describe the `[[servers]]` entries of an mcp-agent-tools
//! config file. The client logic that consumes them lives in the
//! `mat-mcp-client` crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Top-level MCP configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    /// List of MCP server definitions.
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

/// Configuration for a single MCP server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique identifier for this server.
    pub id: String,

    /// Optional display name used in logs. Falls back to `id`.
    #[serde(default)]
    pub name: Option<String>,

    /// Transport type (`"stdio"` or `"sse"`).
    #[serde(default)]
    pub transport: McpTransportKind,

    /// The command to spawn (e.g. `"npx"`). Stdio only.
    #[serde(default)]
    pub command: String,

    /// Arguments to pass to the command. Stdio only.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables to set on the spawned process. Stdio only.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Event-stream URL. SSE only.
    #[serde(default)]
    pub url: Option<String>,

    /// Extra headers sent with every request. SSE only.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request authentication. SSE only.
    #[serde(default)]
    pub auth: Option<McpAuthConfig>,

    /// Glob patterns restricting which tools are exposed (`None` = all).
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,

    /// Cache the `tools/list` result for the lifetime of a connection.
    #[serde(default = "d_true")]
    pub cache_tools_list: bool,
}

impl McpServerConfig {
    /// Name used for logging: `name` if set, otherwise `id`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Transport kind for connecting to an MCP server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Sse,
}

/// Authentication for a network MCP server.
///
/// `auth_type` is kept as a free-form string so that an unsupported scheme
/// is reported by the client at construction time with a clear message
/// instead of a generic deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpAuthConfig {
    /// `"secret_key"` (HMAC request signing) or `"jwt"` (bearer token).
    #[serde(rename = "type")]
    pub auth_type: String,

    /// Environment variable holding the shared secret.
    #[serde(default)]
    pub secret_env: Option<String>,

    /// Inline shared secret. Prefer `secret_env`.
    #[serde(default)]
    pub secret: Option<String>,
}

impl McpAuthConfig {
    /// Resolve the shared secret, preferring the environment variable.
    pub fn resolve_secret(&self) -> Result<String> {
        if let Some(var) = &self.secret_env {
            return match std::env::var(var) {
                Ok(value) if !value.is_empty() => Ok(value),
                _ => Err(Error::Auth(format!("environment variable {var} is unset or empty"))),
            };
        }
        match &self.secret {
            Some(secret) if !secret.is_empty() => Ok(secret.clone()),
            _ => Err(Error::Auth("no secret configured (set secret_env or secret)".into())),
        }
    }
}

fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_defaults() {
        let cfg: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.servers.is_empty());
    }

    #[test]
    fn deserialize_server_config() {
        let raw = r#"{
            "id": "filesystem",
            "command": "npx",
            "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
            "transport": "stdio"
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.id, "filesystem");
        assert_eq!(cfg.command, "npx");
        assert_eq!(cfg.args.len(), 3);
        assert_eq!(cfg.transport, McpTransportKind::Stdio);
        assert!(cfg.cache_tools_list);
        assert!(cfg.allowed_tools.is_none());
    }

    #[test]
    fn transport_kind_defaults_to_stdio() {
        let raw = r#"{ "id": "test", "command": "echo" }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.transport, McpTransportKind::Stdio);
        assert_eq!(cfg.display_name(), "test");
    }

    #[test]
    fn sse_transport_with_auth() {
        let raw = r#"{
            "id": "remote",
            "transport": "sse",
            "url": "http://localhost:8080/sse",
            "auth": { "type": "jwt", "secret": "s3cret" }
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.transport, McpTransportKind::Sse);
        assert_eq!(cfg.url.as_deref(), Some("http://localhost:8080/sse"));
        let auth = cfg.auth.unwrap();
        assert_eq!(auth.auth_type, "jwt");
        assert_eq!(auth.resolve_secret().unwrap(), "s3cret");
    }

    #[test]
    fn deserialize_with_env() {
        let raw = r#"{
            "id": "test",
            "command": "node",
            "args": ["server.js"],
            "env": { "NODE_ENV": "production" }
        }"#;
        let cfg: McpServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.env.get("NODE_ENV").unwrap(), "production");
    }

    #[test]
    fn secret_env_takes_precedence() {
        let auth = McpAuthConfig {
            auth_type: "secret_key".into(),
            secret_env: Some("MAT_DOMAIN_TEST_SECRET_THAT_IS_NEVER_SET".into()),
            secret: Some("inline".into()),
        };
        let err = auth.resolve_secret().unwrap_err();
        assert!(err.to_string().contains("MAT_DOMAIN_TEST_SECRET_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn missing_secret_is_an_auth_error() {
        let auth = McpAuthConfig {
            auth_type: "jwt".into(),
            secret_env: None,
            secret: None,
        };
        assert!(matches!(auth.resolve_secret(), Err(Error::Auth(_))));
    }
}
