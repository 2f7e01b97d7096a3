//! `check-mcp`: connect to an MCP server, print what it offers, disconnect.
//!
//! Usage:
//!   check-mcp stdio /usr/local/bin/docker run -i --rm alpine/socat STDIO TCP:host.docker.internal:8811
//!   MCP_SECRET=... check-mcp sse https://tools.example.com/sse --auth-type jwt --secret-env MCP_SECRET
//!   check-mcp config mcp.toml --server docker --call search --arguments '{"q":"rust"}'
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

mod cli;

use std::path::Path;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mat_domain::config::ConfigSeverity;
use mat_mcp_client::{
    McpClientWithAuth, McpConfig, McpManager, McpServer, McpToolDef, SseParams, StdioParams,
    ToolCallResult,
};

use cli::{Cli, Command, ProbeArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Stdio { env, name, probe, command, args } => {
            tracing::info!(command = %command, ?args, "starting stdio MCP server");
            let params = StdioParams::new(command)?
                .with_args(args)
                .with_env(env.into_iter().collect());
            probe_server(McpServer::stdio(name, params), &probe).await
        }
        Command::Sse { url, auth_type, secret_env, headers, name, probe } => {
            let server = match auth_type {
                Some(auth_type) => {
                    let var = secret_env.context("--auth-type requires --secret-env")?;
                    let secret = std::env::var(&var)
                        .with_context(|| format!("environment variable {var} is not set"))?;
                    McpClientWithAuth::new(&url, &auth_type, &secret, headers.into_iter().collect(), name)?
                        .into_server()
                }
                None => McpServer::sse(name, SseParams::new(&url)?.with_headers(headers)),
            };
            probe_server(server, &probe).await
        }
        Command::Config { path, server, probe } => probe_config(&path, server.as_deref(), &probe).await,
    }
}

/// Connect, report, and always disconnect.
async fn probe_server(mut server: McpServer, probe: &ProbeArgs) -> anyhow::Result<()> {
    let outcome = run_probe(&mut server, probe).await;
    server.disconnect().await;
    outcome
}

async fn run_probe(server: &mut McpServer, probe: &ProbeArgs) -> anyhow::Result<()> {
    let call = probe.tool_call()?;

    server.connect().await?;

    let tools = server.list_tools().await.context("failed to list tools")?;
    print_tools(tools.iter().map(|t| (t.name.clone(), t)));

    if probe.prompts {
        let prompts = server.list_prompts().await.context("failed to list prompts")?;
        println!("Found {} prompts:", prompts.len());
        for prompt in &prompts {
            println!(
                "Prompt: {}, Description: {}",
                prompt.name,
                prompt.description.as_deref().unwrap_or("")
            );
        }
    }

    if let Some(call) = call {
        let tool = call.tool_name().to_string();
        let result = server
            .call_tool(call)
            .await
            .with_context(|| format!("failed to call {tool}"))?;
        print_result(&result)?;
    }

    Ok(())
}

async fn probe_config(path: &Path, server_id: Option<&str>, probe: &ProbeArgs) -> anyhow::Result<()> {
    let config = McpConfig::load(path).with_context(|| format!("failed to load {}", path.display()))?;

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => tracing::error!("{issue}"),
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        bail!("{} has configuration errors", path.display());
    }

    if let Some(id) = server_id {
        let cfg = config
            .server(id)
            .with_context(|| format!("no server with id \"{id}\" in {}", path.display()))?;
        return probe_server(McpServer::from_config(cfg)?, probe).await;
    }

    if probe.call.is_some() {
        bail!("--call needs --server when probing a whole config file");
    }

    let mut manager = McpManager::from_config(&config)?;
    let connected = manager.connect_all().await;
    println!("Connected to {connected}/{} servers", manager.server_count());

    let tools = manager.list_tools().await;
    print_tools(tools.iter().map(|(id, t)| (format!("mcp:{id}:{}", t.name), t)));

    manager.shutdown().await;

    if connected == 0 && !manager.is_empty() {
        bail!("no MCP server could be connected");
    }
    Ok(())
}

fn print_tools<'a>(tools: impl ExactSizeIterator<Item = (String, &'a McpToolDef)>) {
    println!("Found {} tools:", tools.len());
    for (label, tool) in tools {
        println!("Tool: {label}, Description: {}", tool.description);
    }
}

fn print_result(result: &ToolCallResult) -> anyhow::Result<()> {
    if let Some(err) = result.remote_error() {
        return Err(err.into());
    }
    println!("{}", result.text());
    if let Some(structured) = &result.structured_content {
        println!("{}", serde_json::to_string_pretty(structured)?);
    }
    Ok(())
}
