//! SSE transport: the MCP HTTP+SSE binding.
//!
//! 1. `GET <url>` with `Accept: text/event-stream` opens a long-lived stream.
//! 2. The server's first `endpoint` event names the URL to POST messages to
//!    (relative URLs are resolved against `<url>`).
//! 3. Every JSON-RPC request is POSTed there; its response arrives later as a
//!    `message` event on the stream and is routed to the waiter by id.
//!
//! Every HTTP request carries the static headers followed by whatever the
//! auth middleware pipeline adds for that specific request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use url::Url;

use mat_domain::config::McpTransportKind;

use super::{McpTransport, TransportBinding, TransportError};
use crate::auth::{HeaderPipeline, HeaderTransform, Headers, OutboundRequest};
use crate::error::McpError;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// URL, static headers and auth middleware for an SSE server.
#[derive(Debug, Clone)]
pub struct SseParams {
    url: Url,
    headers: Headers,
    middleware: HeaderPipeline,
}

impl SseParams {
    /// Parse and validate the event-stream URL (`http` or `https` only).
    pub fn new(url: &str) -> Result<Self, McpError> {
        let url = Url::parse(url)
            .map_err(|e| McpError::Configuration(format!("invalid URL \"{url}\": {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(McpError::Configuration(format!(
                "unsupported URL scheme \"{}\" (expected http or https)",
                url.scheme()
            )));
        }
        Ok(Self {
            url,
            headers: Headers::new(),
            middleware: HeaderPipeline::new(),
        })
    }

    /// Static headers sent with every request, before middleware runs.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Append a middleware stage. Stages run in the order they are added.
    pub fn with_middleware(mut self, stage: Arc<dyn HeaderTransform>) -> Self {
        self.middleware.push(stage);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn middleware(&self) -> &HeaderPipeline {
        &self.middleware
    }

    /// Headers for one outbound request: static headers, then middleware.
    pub fn headers_for(&self, method: &str, url: &Url, body: &[u8]) -> Headers {
        let path = path_and_query(url);
        let request = OutboundRequest::new(method, &path, body);
        self.middleware.apply(&request, self.headers.clone())
    }
}

/// `/path?query` portion of a URL, as covered by request signatures.
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    }
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidHeader(format!("{name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Opens an [`SseTransport`].
#[derive(Debug, Clone)]
pub struct SseBinding {
    params: SseParams,
    client: reqwest::Client,
}

impl SseBinding {
    pub fn new(params: SseParams) -> Self {
        Self {
            params,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TransportBinding for SseBinding {
    fn kind(&self) -> McpTransportKind {
        McpTransportKind::Sse
    }

    fn target(&self) -> String {
        self.params.url.to_string()
    }

    async fn open(&self) -> Result<Arc<dyn McpTransport>, TransportError> {
        let transport = SseTransport::connect(self.client.clone(), self.params.clone()).await?;
        Ok(Arc::new(transport))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An open SSE session. A background task owns the event stream; dropping
/// or shutting down the transport cancels it, which closes the connection.
pub struct SseTransport {
    client: reqwest::Client,
    params: SseParams,
    endpoint: Url,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SseTransport {
    /// Open the event stream and wait for the server's `endpoint` event.
    pub async fn connect(client: reqwest::Client, params: SseParams) -> Result<Self, TransportError> {
        let url = params.url.clone();
        let headers = to_header_map(&params.headers_for("GET", &url, b""))?;

        tracing::debug!(url = %url, "opening MCP event stream");
        let response = client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        tokio::spawn(read_events(
            response.bytes_stream().eventsource(),
            endpoint_tx,
            Arc::clone(&pending),
            Arc::clone(&alive),
            cancel.clone(),
        ));

        // Cancels the reader if this future errors out or is dropped early.
        let reader_guard = cancel.drop_guard();
        let endpoint = match endpoint_rx.await {
            Ok(raw) => resolve_endpoint(&url, &raw)?,
            Err(_) => return Err(TransportError::Closed),
        };
        let cancel = reader_guard.disarm();

        tracing::debug!(endpoint = %endpoint, "MCP message endpoint received");

        Ok(Self {
            client,
            params,
            endpoint,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            cancel,
        })
    }

    /// The URL JSON-RPC messages are POSTed to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, body: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }

        let headers = to_header_map(&self.params.headers_for("POST", &self.endpoint, &body))?;
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Resolve the `endpoint` event against the stream URL. The endpoint must
/// share the stream's origin so signed requests never leave the server.
fn resolve_endpoint(base: &Url, raw: &str) -> Result<Url, TransportError> {
    let endpoint = base
        .join(raw.trim())
        .map_err(|e| TransportError::InvalidEndpoint(format!("{raw}: {e}")))?;
    if endpoint.origin() != base.origin() {
        return Err(TransportError::InvalidEndpoint(format!(
            "{endpoint} is not on the same origin as {base}"
        )));
    }
    Ok(endpoint)
}

/// Route every `message` event to the waiter registered for its id until
/// the stream ends or `cancel` fires. Waiters still pending at that point
/// are dropped, which fails them with [`TransportError::Closed`].
async fn read_events<S, E>(
    events: S,
    endpoint_tx: oneshot::Sender<String>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<eventsource_stream::Event, E>>,
    E: std::fmt::Display,
{
    let mut events = std::pin::pin!(events);
    let mut endpoint_tx = Some(endpoint_tx);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = events.next() => next,
        };
        match next {
            Some(Ok(event)) => match event.event.as_str() {
                "endpoint" => match endpoint_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(event.data);
                    }
                    None => tracing::debug!("ignoring repeated endpoint event"),
                },
                "message" | "" => dispatch(&pending, &event.data),
                other => tracing::debug!(event = other, "ignoring SSE event"),
            },
            Some(Err(e)) => {
                tracing::warn!(error = %e, "MCP event stream error");
                break;
            }
            None => {
                tracing::debug!("MCP event stream ended");
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    pending.lock().clear();
}

fn dispatch(pending: &PendingMap, data: &str) {
    match JsonRpcResponse::parse_incoming(data) {
        Some(resp) => match pending.lock().remove(&resp.id) {
            Some(tx) => {
                let _ = tx.send(resp);
            }
            None => tracing::debug!(id = resp.id, "response for unknown request id"),
        },
        None => tracing::debug!(data = %data, "skipping non-response message from MCP server"),
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_vec(&JsonRpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        tracing::debug!(id, method, "sending MCP request");
        if let Err(e) = self.post(body).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| TransportError::Closed)
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let body = serde_json::to_vec(&JsonRpcNotification::new(method))?;
        tracing::debug!(method, "sending MCP notification");
        self.post(body).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        self.pending.lock().clear();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
