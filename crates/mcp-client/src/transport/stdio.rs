//! Stdio transport: the server is a child process speaking newline-delimited
//! JSON-RPC on stdin/stdout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use mat_domain::config::McpTransportKind;

use super::{McpTransport, TransportBinding, TransportError};
use crate::error::McpError;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Maximum number of non-JSON lines to skip before declaring the server broken.
const MAX_SKIP_LINES: usize = 1000;

/// How long a child gets to exit after stdin is closed before it is killed.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Executable, arguments and extra environment for a stdio server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioParams {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl StdioParams {
    pub fn new(command: impl Into<String>) -> Result<Self, McpError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(McpError::Configuration("stdio command must not be empty".into()));
        }
        Ok(Self {
            command,
            args: Vec::new(),
            env: HashMap::new(),
        })
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Variables added on top of the inherited environment.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }
}

/// Opens a [`StdioTransport`] by spawning the configured command.
#[derive(Debug, Clone)]
pub struct StdioBinding {
    params: StdioParams,
}

impl StdioBinding {
    pub fn new(params: StdioParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl TransportBinding for StdioBinding {
    fn kind(&self) -> McpTransportKind {
        McpTransportKind::Stdio
    }

    fn target(&self) -> String {
        std::iter::once(self.params.command.as_str())
            .chain(self.params.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn open(&self) -> Result<Arc<dyn McpTransport>, TransportError> {
        Ok(Arc::new(StdioTransport::spawn(&self.params)?))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stdio transport: communicates with a child process over stdin/stdout.
///
/// Each JSON-RPC message is a single newline-delimited line.
/// The `request_lock` serializes entire request/response cycles to prevent
/// response mismatching when multiple callers use the same server.
/// The child is spawned with `kill_on_drop`, so dropping the transport
/// without calling [`shutdown`](McpTransport::shutdown) still reaps it.
pub struct StdioTransport {
    /// `None` once shutdown has closed the pipe.
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    /// Serializes full request/response cycles to prevent response mismatching.
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
    pid: Option<u32>,
}

impl StdioTransport {
    /// Spawn a child process from the given parameters.
    pub fn spawn(params: &StdioParams) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let pid = child.id();

        // From here on, `child` is dropped (and killed) on any early return.
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            )))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            )))?;

        if let Some(stderr) = child.stderr.take() {
            let command = params.command.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(command = %command, line = %line, "MCP server stderr");
                }
            });
        }

        tracing::debug!(command = %params.command, ?pid, "spawned MCP server process");

        Ok(Self {
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            pid,
        })
    }

    /// OS process id of the child, if it was still running at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Get the next unique request ID.
    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Write a line of JSON to stdin.
    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(TransportError::Closed);
        };
        let written = async {
            stdin.write_all(json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            // A closed pipe means the child is gone.
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Closed);
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Read a line of JSON from stdout, skipping any empty or non-JSON lines.
    ///
    /// Gives up after [`MAX_SKIP_LINES`] non-JSON lines to prevent spinning
    /// on a misconfigured server that writes logging to stdout.
    async fn read_line(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Closed);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "MCP server produced too many non-JSON lines on stdout",
                )));
            }
            tracing::debug!(line = %trimmed, "skipping non-JSON line from MCP server stdout");
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let _guard = self.request_lock.lock().await;

        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)?;

        tracing::debug!(id, method, "sending MCP request");
        self.write_line(&json).await?;

        // Servers may interleave notifications or server-to-client requests
        // between our request and its response; skip anything that is not
        // the response with our id.
        loop {
            let line = self.read_line().await?;
            match JsonRpcResponse::parse_incoming(&line) {
                Some(resp) if resp.id == id => return Ok(resp),
                Some(resp) => {
                    tracing::debug!(
                        expected_id = id,
                        got_id = resp.id,
                        "received response for different request, continuing"
                    );
                }
                None => {
                    tracing::debug!(line = %line, "skipping non-response message from MCP server");
                }
            }
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        let json = serde_json::to_string(&notif)?;
        tracing::debug!(method, "sending MCP notification");
        self.write_line(&json).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        // Dropping the handle closes the pipe; the child sees EOF and exits.
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            if let Err(e) = stdin.flush().await {
                tracing::debug!(error = %e, "error flushing MCP server stdin");
            }
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(?status, "MCP server process exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "error waiting for MCP server process");
            }
            Err(_) => {
                tracing::warn!("MCP server process did not exit within timeout, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill MCP server process");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_a_configuration_error() {
        assert!(matches!(StdioParams::new("  "), Err(McpError::Configuration(_))));
    }

    #[test]
    fn binding_target_joins_command_line() {
        let params = StdioParams::new("docker")
            .unwrap()
            .with_args(["run", "-i", "--rm", "alpine/socat"]);
        let binding = StdioBinding::new(params);
        assert_eq!(binding.target(), "docker run -i --rm alpine/socat");
        assert_eq!(binding.kind(), McpTransportKind::Stdio);
    }

    #[tokio::test]
    async fn spawn_failure_is_io_error() {
        let params = StdioParams::new("/nonexistent/mcp-server-binary").unwrap();
        let err = StdioBinding::new(params).open().await.err().unwrap();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn eof_marks_transport_closed() {
        let params = StdioParams::new("echo").unwrap().with_args(["hello"]);
        let transport = StdioTransport::spawn(&params).unwrap();

        let err = transport.send_request("initialize", None).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed | TransportError::Io(_)));
        assert!(!transport.is_alive());

        transport.shutdown().await;
        transport.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn server_request_with_colliding_id_is_skipped() {
        let script = r#"read -r line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"method":"ping"}'
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'
exec cat >/dev/null"#;
        let params = StdioParams::new("sh").unwrap().with_args(["-c", script]);
        let transport = StdioTransport::spawn(&params).unwrap();

        let resp = transport.send_request("initialize", None).await.unwrap();
        assert_eq!(resp.id, 1);
        assert_eq!(resp.into_result().unwrap()["ok"], true);
        transport.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_closes_stdin_and_child_exits_on_eof() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("exited");
        let script = format!(
            "while read -r line; do :; done; echo clean > '{}'",
            marker.display()
        );
        let params = StdioParams::new("sh").unwrap().with_args(["-c".to_string(), script]);
        let transport = StdioTransport::spawn(&params).unwrap();

        let started = std::time::Instant::now();
        transport.shutdown().await;
        assert!(started.elapsed() < SHUTDOWN_GRACE);
        assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "clean");

        let err = transport.send_notification("notifications/initialized").await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_reaps_the_child() {
        let params = StdioParams::new("cat").unwrap();
        let transport = StdioTransport::spawn(&params).unwrap();
        assert!(transport.is_alive());
        assert!(transport.pid().is_some());

        transport.shutdown().await;
        assert!(!transport.is_alive());
        let status = transport.child.lock().await.try_wait().unwrap();
        assert!(status.is_some());
    }
}
