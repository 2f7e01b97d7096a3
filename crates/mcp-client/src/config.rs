//! MCP configuration types, re-exported from `mat-domain`, and their
//! translation into validated connection parameters.
//!
//! The canonical definitions live in `mat_domain::config` so that other
//! tools can read the config file without depending on the client crate.

pub use mat_domain::config::{McpAuthConfig, McpConfig, McpServerConfig, McpTransportKind};

use crate::auth::client_auth_middleware;
use crate::error::McpError;
use crate::transport::{ConnectionParams, SseParams, StdioParams};

/// Build the connection parameters described by one `[[servers]]` entry.
///
/// Auth secrets are resolved here, so a missing environment variable is
/// reported before anything is spawned or dialed.
pub fn connection_params(cfg: &McpServerConfig) -> Result<ConnectionParams, McpError> {
    match cfg.transport {
        McpTransportKind::Stdio => {
            let params = StdioParams::new(cfg.command.clone())
                .map_err(|e| prefixed(cfg, e))?
                .with_args(cfg.args.iter().cloned())
                .with_env(cfg.env.clone());
            Ok(params.into())
        }
        McpTransportKind::Sse => {
            let url = cfg.url.as_deref().ok_or_else(|| {
                McpError::Configuration(format!("server {}: sse transport requires a url", cfg.id))
            })?;
            let mut params = SseParams::new(url)
                .map_err(|e| prefixed(cfg, e))?
                .with_headers(cfg.headers.clone());

            if let Some(auth) = &cfg.auth {
                let scheme = auth.auth_type.parse().map_err(|e| prefixed(cfg, e))?;
                let secret = auth
                    .resolve_secret()
                    .map_err(|e| McpError::Configuration(format!("server {}: {e}", cfg.id)))?;
                let middleware = client_auth_middleware(scheme, &secret, cfg.display_name())
                    .map_err(|e| prefixed(cfg, e))?;
                params = params.with_middleware(middleware);
            }
            Ok(params.into())
        }
    }
}

fn prefixed(cfg: &McpServerConfig, e: McpError) -> McpError {
    match e {
        McpError::Configuration(msg) => McpError::Configuration(format!("server {}: {msg}", cfg.id)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> McpServerConfig {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn empty_config_defaults() {
        let cfg: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.servers.is_empty());
    }

    #[test]
    fn stdio_server_params() {
        let cfg = parse(
            r#"{
                "id": "filesystem",
                "command": "npx",
                "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
                "env": { "NODE_ENV": "production" }
            }"#,
        );
        let ConnectionParams::Stdio(params) = connection_params(&cfg).unwrap() else {
            panic!("expected stdio params");
        };
        assert_eq!(params.command(), "npx");
        assert_eq!(params.args().len(), 3);
        assert_eq!(params.env().get("NODE_ENV").unwrap(), "production");
    }

    #[test]
    fn stdio_without_command_is_rejected() {
        let cfg = parse(r#"{ "id": "broken" }"#);
        let err = connection_params(&cfg).unwrap_err();
        assert!(matches!(err, McpError::Configuration(ref m) if m.starts_with("server broken:")));
    }

    #[test]
    fn sse_server_params() {
        let cfg = parse(
            r#"{
                "id": "remote",
                "transport": "sse",
                "url": "http://localhost:8080/sse",
                "headers": { "X-Tenant": "acme" }
            }"#,
        );
        let params = connection_params(&cfg).unwrap();
        assert_eq!(params.kind(), McpTransportKind::Sse);
        let ConnectionParams::Sse(params) = params else {
            panic!("expected sse params");
        };
        assert_eq!(params.url().as_str(), "http://localhost:8080/sse");
        assert_eq!(params.headers().get("X-Tenant").unwrap(), "acme");
        assert!(params.middleware().is_empty());
    }

    #[test]
    fn sse_without_url_is_rejected() {
        let cfg = parse(r#"{ "id": "remote", "transport": "sse" }"#);
        assert!(matches!(connection_params(&cfg), Err(McpError::Configuration(_))));
    }

    #[test]
    fn sse_with_inline_jwt_secret_adds_middleware() {
        let cfg = parse(
            r#"{
                "id": "remote",
                "transport": "sse",
                "url": "https://tools.example.com/sse",
                "auth": { "type": "jwt", "secret": "s3cret" }
            }"#,
        );
        let ConnectionParams::Sse(params) = connection_params(&cfg).unwrap() else {
            panic!("expected sse params");
        };
        assert_eq!(params.middleware().names(), vec!["jwt"]);
    }

    #[test]
    fn unsupported_auth_type_is_rejected() {
        let cfg = parse(
            r#"{
                "id": "remote",
                "transport": "sse",
                "url": "https://tools.example.com/sse",
                "auth": { "type": "oauth", "secret": "s3cret" }
            }"#,
        );
        let err = connection_params(&cfg).unwrap_err();
        assert!(err.to_string().contains("oauth"));
    }

    #[test]
    fn missing_secret_env_is_rejected() {
        let cfg = parse(
            r#"{
                "id": "remote",
                "transport": "sse",
                "url": "https://tools.example.com/sse",
                "auth": { "type": "secret_key", "secret_env": "MAT_TEST_SECRET_THAT_IS_NEVER_SET" }
            }"#,
        );
        let err = connection_params(&cfg).unwrap_err();
        assert!(matches!(err, McpError::Configuration(ref m) if m.contains("MAT_TEST_SECRET_THAT_IS_NEVER_SET")));
    }
}
