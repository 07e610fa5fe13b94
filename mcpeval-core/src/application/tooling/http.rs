use super::error::ToolInvokeError;
use super::transport::RpcTransport;
use crate::config::ServerSpec;
use crate::infrastructure::rpc::{RpcRequest, RpcResponse, response_key};
use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// Streamable-HTTP transport: one POST per JSON-RPC message.
pub(crate) struct HttpTransport {
    server: String,
    endpoint: String,
    client: Client,
    headers: HeaderMap,
    session: RwLock<Option<String>>,
    id_counter: AtomicU64,
    alive: AtomicBool,
    closing: AtomicBool,
}

impl HttpTransport {
    pub(crate) fn connect(spec: &ServerSpec) -> Result<Arc<Self>, ToolInvokeError> {
        let startup = |reason: String| ToolInvokeError::Startup {
            server: spec.identifier.clone(),
            reason,
        };

        let mut headers = HeaderMap::new();
        for (key, value) in &spec.env {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|err| startup(format!("invalid header name '{key}': {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| startup(format!("invalid value for header '{key}': {err}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .build()
            .map_err(|err| startup(format!("failed to build HTTP client: {err}")))?;

        info!(server = %spec.identifier, endpoint = %spec.target, "Connecting to MCP server over HTTP");
        Ok(Arc::new(Self {
            server: spec.identifier.clone(),
            endpoint: spec.target.clone(),
            client,
            headers,
            session: RwLock::new(None),
            id_counter: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            closing: AtomicBool::new(false),
        }))
    }

    async fn post(&self, payload: &RpcRequest) -> Result<reqwest::Response, ToolInvokeError> {
        let session = self.session.read().await.clone();
        let mut builder = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header(ACCEPT, ACCEPT_BOTH)
            .json(payload);
        if let Some(session) = &session {
            builder = builder.header(SESSION_HEADER, session);
        }

        let response = builder.send().await.map_err(|err| self.send_error(err))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND && session.is_some() {
            warn!(server = %self.server, "MCP session expired on the server");
            self.alive.store(false, Ordering::SeqCst);
            return Err(self.terminated());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolInvokeError::Transport {
                server: self.server.clone(),
                message: format!("HTTP {status}: {}", body.trim()),
            });
        }
        Ok(response)
    }

    async fn exchange(&self, id: &str, method: &str, params: Value) -> Result<Value, ToolInvokeError> {
        let payload = RpcRequest::request(id, method, params);
        let response = self.post(&payload).await?;

        if method == "initialize" {
            if let Some(session) = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|value| value.to_str().ok())
            {
                debug!(server = %self.server, session, "captured MCP session id");
                *self.session.write().await = Some(session.to_string());
            }
        }

        let event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));

        let message = if event_stream {
            read_event_stream(response.bytes_stream(), id)
                .await
                .map_err(|err| match err {
                    EventStreamError::Transport(err) => self.send_error(err),
                    other => ToolInvokeError::Transport {
                        server: self.server.clone(),
                        message: format!("malformed event stream: {other}"),
                    },
                })?
        } else {
            let body = response.text().await.map_err(|err| self.send_error(err))?;
            let value =
                serde_json::from_str::<Value>(&body).map_err(|source| ToolInvokeError::InvalidJson {
                    server: self.server.clone(),
                    source,
                })?;
            select_response(vec![value], id)
        };

        let message = message.ok_or_else(|| ToolInvokeError::Transport {
            server: self.server.clone(),
            message: format!("no response for request '{id}' in HTTP body"),
        })?;
        let response: RpcResponse =
            serde_json::from_value(message).map_err(|source| ToolInvokeError::InvalidJson {
                server: self.server.clone(),
                source,
            })?;
        response.into_result().map_err(|error| ToolInvokeError::Rpc {
            server: self.server.clone(),
            code: error.code,
            message: error.message,
        })
    }

    fn send_error(&self, err: reqwest::Error) -> ToolInvokeError {
        if err.is_connect() {
            self.alive.store(false, Ordering::SeqCst);
            return self.terminated();
        }
        ToolInvokeError::Transport {
            server: self.server.clone(),
            message: err.to_string(),
        }
    }

    fn terminated(&self) -> ToolInvokeError {
        ToolInvokeError::Terminated {
            server: self.server.clone(),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ToolInvokeError> {
        if !self.is_alive() {
            return Err(self.terminated());
        }
        let id = format!("req-{}", self.id_counter.fetch_add(1, Ordering::SeqCst));
        match tokio::time::timeout(timeout, self.exchange(&id, method, params)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(server = %self.server, method, request_id = %id, ?timeout, "MCP request timed out");
                Err(ToolInvokeError::Timeout {
                    server: self.server.clone(),
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolInvokeError> {
        self.post(&RpcRequest::notification(method, params))
            .await
            .map(|_| ())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.closing.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<(), ToolInvokeError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let session = self.session.write().await.take();
        let Some(session) = session else {
            return Ok(());
        };
        if !self.alive.load(Ordering::SeqCst) {
            return Ok(());
        }

        let result = self
            .client
            .delete(&self.endpoint)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session)
            .send()
            .await;
        match result {
            Ok(response)
                if response.status().is_success()
                    || response.status() == StatusCode::METHOD_NOT_ALLOWED =>
            {
                debug!(server = %self.server, "MCP session closed");
                Ok(())
            }
            Ok(response) => Err(ToolInvokeError::Transport {
                server: self.server.clone(),
                message: format!("session close returned HTTP {}", response.status()),
            }),
            Err(err) => Err(ToolInvokeError::Transport {
                server: self.server.clone(),
                message: err.to_string(),
            }),
        }
    }
}

/// Read SSE events until one carries the response to `id`.
///
/// Server notifications and requests interleaved on the stream are skipped,
/// and the stream is dropped as soon as the response is found.
async fn read_event_stream<S, B, E>(stream: S, id: &str) -> Result<Option<Value>, EventStreamError<E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut events = pin!(stream.eventsource());
    while let Some(event) = events.next().await {
        let event = event?;
        if event.data.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&event.data) {
            Ok(value) => {
                if let Some(message) = select_response(vec![value], id) {
                    return Ok(Some(message));
                }
            }
            Err(err) => debug!(%err, event = %event.event, "skipping non-JSON event data"),
        }
    }
    Ok(None)
}

/// Pick the response whose id matches `id`; batches are flattened.
fn select_response(messages: Vec<Value>, id: &str) -> Option<Value> {
    messages
        .into_iter()
        .flat_map(|message| match message {
            Value::Array(items) => items,
            other => vec![other],
        })
        .find(|message| {
            message.get("method").is_none()
                && message
                    .get("id")
                    .and_then(response_key)
                    .is_some_and(|key| key == id)
        })
}
