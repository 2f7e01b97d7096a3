use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use mat_mcp_client::ToolCall;

/// Connect to an MCP server, list its tools and disconnect.
#[derive(Debug, Parser)]
#[command(name = "check-mcp", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Spawn a server process and talk to it over stdin/stdout.
    Stdio {
        /// Extra environment variable for the process (repeatable).
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        env: Vec<(String, String)>,
        /// Name used in logs.
        #[arg(long, default_value = "stdio")]
        name: String,
        #[command(flatten)]
        probe: ProbeArgs,
        /// Executable to run.
        command: String,
        /// Arguments for the executable. Everything after the command is
        /// passed through.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Connect to a server over HTTP + SSE.
    Sse {
        /// Event-stream URL.
        url: String,
        /// Request authentication: `secret_key` or `jwt`.
        #[arg(long, requires = "secret_env")]
        auth_type: Option<String>,
        /// Environment variable holding the shared secret.
        #[arg(long, value_name = "VAR")]
        secret_env: Option<String>,
        /// Extra header sent with every request (repeatable).
        #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        headers: Vec<(String, String)>,
        /// Name used in logs and as the JWT issuer.
        #[arg(long, default_value = "check-mcp")]
        name: String,
        #[command(flatten)]
        probe: ProbeArgs,
    },
    /// Probe servers from a TOML config file.
    Config {
        /// Path to the config file.
        path: PathBuf,
        /// Only probe the server with this id (default: all).
        #[arg(long)]
        server: Option<String>,
        #[command(flatten)]
        probe: ProbeArgs,
    },
}

/// What to do once connected, beyond listing tools.
#[derive(Debug, Clone, Default, Args)]
pub struct ProbeArgs {
    /// Also list prompts.
    #[arg(long)]
    pub prompts: bool,
    /// Call this tool after listing.
    #[arg(long, value_name = "TOOL")]
    pub call: Option<String>,
    /// Arguments for --call, as a JSON object.
    #[arg(long, value_name = "JSON", requires = "call")]
    pub arguments: Option<String>,
}

impl ProbeArgs {
    /// The tool call requested with `--call`, if any.
    pub fn tool_call(&self) -> anyhow::Result<Option<ToolCall>> {
        let Some(tool) = &self.call else {
            return Ok(None);
        };
        let arguments = self
            .arguments
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .context("--arguments is not valid JSON")?;
        Ok(Some(ToolCall::with_arguments(tool.clone(), arguments)?))
    }
}

/// Parse `KEY=VALUE`. The value may itself contain `=`.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got \"{s}\"")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_val_parsing() {
        assert_eq!(parse_key_val("A=b=c").unwrap(), ("A".into(), "b=c".into()));
        assert_eq!(parse_key_val("EMPTY=").unwrap(), ("EMPTY".into(), String::new()));
        assert!(parse_key_val("=x").is_err());
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn stdio_passes_trailing_args_through() {
        let cli = Cli::try_parse_from([
            "check-mcp", "stdio", "--env", "FOO=bar", "docker", "run", "-i", "--rm", "alpine/socat",
        ])
        .unwrap();
        let Command::Stdio { command, args, env, .. } = cli.command else {
            panic!("expected stdio");
        };
        assert_eq!(command, "docker");
        assert_eq!(args, vec!["run", "-i", "--rm", "alpine/socat"]);
        assert_eq!(env, vec![("FOO".to_string(), "bar".to_string())]);
    }

    #[test]
    fn sse_auth_requires_secret_env() {
        assert!(Cli::try_parse_from(["check-mcp", "sse", "http://h/sse", "--auth-type", "jwt"]).is_err());

        let cli = Cli::try_parse_from([
            "check-mcp", "sse", "http://h/sse", "--auth-type", "jwt", "--secret-env", "MCP_SECRET",
            "--header", "X-Tenant=acme",
        ])
        .unwrap();
        let Command::Sse { auth_type, secret_env, headers, .. } = cli.command else {
            panic!("expected sse");
        };
        assert_eq!(auth_type.as_deref(), Some("jwt"));
        assert_eq!(secret_env.as_deref(), Some("MCP_SECRET"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn tool_call_from_probe_args() {
        let probe = ProbeArgs {
            call: Some("search".into()),
            arguments: Some(r#"{"q":"rust"}"#.into()),
            ..Default::default()
        };
        let call = probe.tool_call().unwrap().unwrap();
        assert_eq!(call.tool_name(), "search");
        assert_eq!(call.arguments()["q"], "rust");

        let bad = ProbeArgs {
            call: Some("search".into()),
            arguments: Some("[1, 2]".into()),
            ..Default::default()
        };
        assert!(bad.tool_call().is_err());

        assert!(ProbeArgs::default().tool_call().unwrap().is_none());
    }
}
