mod mcp;

pub use mcp::*;

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl McpConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Look up a server definition by id.
    pub fn server(&self, id: &str) -> Option<&McpServerConfig> {
        self.servers.iter().find(|s| s.id == id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl McpConfig {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for (i, server) in self.servers.iter().enumerate() {
            let field = |name: &str| format!("servers[{i}].{name}");

            if server.id.is_empty() {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: field("id"),
                    message: "server id must not be empty".into(),
                });
            } else if !seen.insert(server.id.as_str()) {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: field("id"),
                    message: format!("duplicate server id \"{}\"", server.id),
                });
            }

            match server.transport {
                McpTransportKind::Stdio => {
                    if server.command.is_empty() {
                        issues.push(ConfigIssue {
                            severity: ConfigSeverity::Error,
                            field: field("command"),
                            message: "stdio transport requires a command".into(),
                        });
                    }
                    if server.url.is_some() || server.auth.is_some() {
                        issues.push(ConfigIssue {
                            severity: ConfigSeverity::Warning,
                            field: field("transport"),
                            message: "url and auth are ignored for stdio servers".into(),
                        });
                    }
                }
                McpTransportKind::Sse => {
                    if server.url.as_deref().map_or(true, str::is_empty) {
                        issues.push(ConfigIssue {
                            severity: ConfigSeverity::Error,
                            field: field("url"),
                            message: "sse transport requires a url".into(),
                        });
                    }
                }
            }

            if let Some(auth) = &server.auth {
                if auth.secret_env.is_none() && auth.secret.is_none() {
                    issues.push(ConfigIssue {
                        severity: ConfigSeverity::Error,
                        field: field("auth"),
                        message: "auth requires secret_env or secret".into(),
                    });
                } else if auth.secret_env.is_none() {
                    issues.push(ConfigIssue {
                        severity: ConfigSeverity::Warning,
                        field: field("auth.secret"),
                        message: "inline secret in config file; prefer secret_env".into(),
                    });
                }
            }
        }

        issues
    }
}
