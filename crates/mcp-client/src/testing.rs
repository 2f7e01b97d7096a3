//! In-memory MCP server used by unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::config::McpTransportKind;
use crate::protocol::{JsonRpcResponse, PROTOCOL_VERSION};
use crate::transport::{McpTransport, TransportBinding, TransportError};

/// Everything the mock server sees, in order.
#[derive(Default)]
pub(crate) struct Log(Mutex<Vec<String>>);

impl Log {
    pub(crate) fn push(&self, event: &str) {
        self.0.lock().push(event.to_string());
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

struct MockTransport {
    log: Arc<Log>,
    reject_handshake: bool,
    alive: AtomicBool,
}

#[async_trait]
impl McpTransport for MockTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        self.log.push(method);
        let params = params.unwrap_or(Value::Null);
        Ok(match method {
            "initialize" if self.reject_handshake => {
                JsonRpcResponse::failure(1, -32600, "handshake rejected")
            }
            "initialize" => JsonRpcResponse::success(1, json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "mock", "version": "1.0" }
            })),
            "tools/list" => JsonRpcResponse::success(1, json!({
                "tools": [
                    { "name": "echo", "description": "Echo arguments" },
                    { "name": "fail" }
                ]
            })),
            "prompts/list" => JsonRpcResponse::success(1, json!({
                "prompts": [{ "name": "greet" }]
            })),
            "tools/call" if params["name"] == "fail" => JsonRpcResponse::success(1, json!({
                "content": [{ "type": "text", "text": "boom" }],
                "isError": true
            })),
            "tools/call" => JsonRpcResponse::success(1, json!({
                "content": [{ "type": "text", "text": params["arguments"].to_string() }]
            })),
            _ => JsonRpcResponse::failure(1, -32601, "method not found"),
        })
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        self.log.push(method);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.log.push("shutdown");
    }
}

/// Opens [`MockTransport`]s. Offers the tools `echo` and `fail` and the
/// prompt `greet`.
#[derive(Default)]
pub(crate) struct MockBinding {
    pub(crate) log: Arc<Log>,
    pub(crate) fail_open: bool,
    pub(crate) reject_handshake: bool,
}

#[async_trait]
impl TransportBinding for MockBinding {
    fn kind(&self) -> McpTransportKind {
        McpTransportKind::Stdio
    }

    fn target(&self) -> String {
        "mock".into()
    }

    async fn open(&self) -> Result<Arc<dyn McpTransport>, TransportError> {
        self.log.push("open");
        if self.fail_open {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such executable",
            )));
        }
        Ok(Arc::new(MockTransport {
            log: Arc::clone(&self.log),
            reject_handshake: self.reject_handshake,
            alive: AtomicBool::new(true),
        }))
    }
}
