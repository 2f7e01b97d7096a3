//! MCP manager: owns one [`McpServer`] per configured server, connects them,
//! aggregates their tools and routes calls by server id.

use std::collections::BTreeMap;

use glob::Pattern;

use crate::config::McpConfig;
use crate::error::McpError;
use crate::protocol::{McpToolDef, ToolCallResult};
use crate::request::ToolCall;
use crate::server::McpServer;

/// A server plus the tool filter that applies to it.
struct ManagedServer {
    server: McpServer,
    /// `None` exposes every tool.
    allowed: Option<Vec<Pattern>>,
}

impl ManagedServer {
    fn allows(&self, tool: &str) -> bool {
        self.allowed
            .as_ref()
            .map_or(true, |patterns| patterns.iter().any(|p| p.matches(tool)))
    }
}

/// Manager that holds all MCP server connections, keyed by server id.
#[derive(Default)]
pub struct McpManager {
    servers: BTreeMap<String, ManagedServer>,
}

impl McpManager {
    /// Create an empty manager (no MCP servers configured).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build one server per config entry. Nothing is connected yet.
    pub fn from_config(config: &McpConfig) -> Result<Self, McpError> {
        let mut manager = Self::empty();
        for cfg in &config.servers {
            let server = McpServer::from_config(cfg)?;
            manager.add_server(cfg.id.clone(), server, cfg.allowed_tools.as_deref())?;
        }
        Ok(manager)
    }

    /// Register a server under `id`, optionally restricted to tools matching
    /// one of the `allowed_tools` glob patterns.
    pub fn add_server(
        &mut self,
        id: impl Into<String>,
        server: McpServer,
        allowed_tools: Option<&[String]>,
    ) -> Result<(), McpError> {
        let id = id.into();
        if self.servers.contains_key(&id) {
            return Err(McpError::Configuration(format!("duplicate server id \"{id}\"")));
        }

        let allowed = allowed_tools
            .map(|patterns| {
                patterns
                    .iter()
                    .map(|p| {
                        Pattern::new(p).map_err(|e| {
                            McpError::Configuration(format!(
                                "server {id}: invalid allowed_tools pattern \"{p}\": {e}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        self.servers.insert(id, ManagedServer { server, allowed });
        Ok(())
    }

    /// Connect every server concurrently. Servers that fail are logged and
    /// skipped (not fatal). Returns how many are connected afterwards.
    pub async fn connect_all(&mut self) -> usize {
        let futs = self.servers.iter_mut().map(|(id, managed)| async move {
            if let Err(e) = managed.server.connect().await {
                tracing::warn!(
                    server_id = %id,
                    error = %e,
                    "failed to connect MCP server, skipping"
                );
            }
        });
        futures_util::future::join_all(futs).await;

        let connected = self.connected_count();
        if connected > 0 {
            tracing::info!(connected, configured = self.servers.len(), "MCP manager ready");
        }
        connected
    }

    /// All allowed tools across connected servers, as `(server_id, tool)`.
    ///
    /// A server whose listing fails is logged and left out.
    pub async fn list_tools(&mut self) -> Vec<(String, McpToolDef)> {
        let mut out = Vec::new();
        for (id, managed) in self.servers.iter_mut() {
            if !managed.server.is_connected() {
                continue;
            }
            match managed.server.list_tools().await {
                Ok(tools) => {
                    out.extend(
                        tools
                            .into_iter()
                            .filter(|t| managed.allows(&t.name))
                            .map(|t| (id.clone(), t)),
                    );
                }
                Err(e) => {
                    tracing::warn!(server_id = %id, error = %e, "tools/list failed, skipping server");
                }
            }
        }
        out
    }

    /// Call a tool on a specific server.
    pub async fn call_tool(&self, server_id: &str, call: ToolCall) -> Result<ToolCallResult, McpError> {
        let managed = self
            .servers
            .get(server_id)
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;

        if !managed.allows(call.tool_name()) {
            return Err(McpError::Configuration(format!(
                "tool \"{}\" is not allowed on server {server_id}",
                call.tool_name()
            )));
        }

        managed.server.call_tool(call).await
    }

    pub fn server(&self, id: &str) -> Option<&McpServer> {
        self.servers.get(id).map(|m| &m.server)
    }

    pub fn server_mut(&mut self, id: &str) -> Option<&mut McpServer> {
        self.servers.get_mut(id).map(|m| &mut m.server)
    }

    /// Return the number of configured servers.
    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn connected_count(&self) -> usize {
        self.servers.values().filter(|m| m.server.is_connected()).count()
    }

    /// Check if there are any configured servers.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Disconnect all servers concurrently.
    pub async fn shutdown(&mut self) {
        let futs = self.servers.values_mut().map(|m| m.server.disconnect());
        futures_util::future::join_all(futs).await;
    }
}
