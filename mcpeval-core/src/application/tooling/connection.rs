use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::ToolInvokeError;
use super::http::HttpTransport;
use super::interface::{ConnectionState, ServerConnector, ToolConnection};
use super::process::StdioTransport;
use super::transport::RpcTransport;
use crate::config::{ServerSpec, ServerTransport};
use crate::constants::PROTOCOL_VERSION;
use crate::domain::ToolDescriptor;

/// Upper bound on `tools/list` pages; guards against servers that loop cursors.
const MAX_DISCOVERY_PAGES: usize = 64;

/// A handshaken MCP server with its discovered tool list.
pub struct McpConnection {
    spec: ServerSpec,
    transport: Arc<dyn RpcTransport>,
    state: AtomicU8,
    tools: Vec<ToolDescriptor>,
    instructions: Option<String>,
}

impl McpConnection {
    /// Launch the server, handshake, and discover its tools.
    ///
    /// On any failure the half-started transport is shut down before returning.
    pub async fn start(spec: ServerSpec, timeout: Duration) -> Result<Self, ToolInvokeError> {
        let transport: Arc<dyn RpcTransport> = match spec.transport {
            ServerTransport::Stdio => StdioTransport::spawn(&spec)?,
            ServerTransport::Http => HttpTransport::connect(&spec)?,
        };
        Self::start_with(spec, transport, timeout).await
    }

    pub(crate) async fn start_with(
        spec: ServerSpec,
        transport: Arc<dyn RpcTransport>,
        timeout: Duration,
    ) -> Result<Self, ToolInvokeError> {
        let mut connection = Self {
            spec,
            transport,
            state: AtomicU8::new(ConnectionState::Starting as u8),
            tools: Vec::new(),
            instructions: None,
        };

        let outcome = match connection.handshake(timeout).await {
            Ok(()) => connection.discover_tools(timeout).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(tools) => {
                connection.tools = tools;
                connection.set_state(ConnectionState::Ready);
                info!(
                    server = %connection.spec.identifier,
                    tools = connection.tools.len(),
                    "MCP server ready"
                );
                Ok(connection)
            }
            Err(err) => {
                connection.set_state(ConnectionState::Failed);
                if let Err(close_err) = connection.transport.shutdown().await {
                    debug!(
                        server = %connection.spec.identifier,
                        %close_err,
                        "failed to shut down MCP server after startup failure"
                    );
                }
                Err(err)
            }
        }
    }

    async fn handshake(&mut self, timeout: Duration) -> Result<(), ToolInvokeError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcpeval",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let result = self
            .transport
            .request("initialize", params, timeout)
            .await
            .map_err(|err| self.startup_error(err))?;

        let Some(result) = result.as_object() else {
            return Err(ToolInvokeError::Startup {
                server: self.spec.identifier.clone(),
                reason: "initialize result is not an object".into(),
            });
        };
        let negotiated = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        if negotiated != PROTOCOL_VERSION {
            debug!(
                server = %self.spec.identifier,
                negotiated,
                requested = PROTOCOL_VERSION,
                "server negotiated a different protocol revision"
            );
        }
        self.instructions = result
            .get("instructions")
            .and_then(Value::as_str)
            .map(String::from);

        self.transport
            .notify("notifications/initialized", json!({}))
            .await
            .map_err(|err| self.startup_error(err))?;
        debug!(server = %self.spec.identifier, "MCP handshake complete");
        Ok(())
    }

    /// Issue `tools/list`, following `nextCursor` until the listing is exhausted.
    async fn discover_tools(&self, timeout: Duration) -> Result<Vec<ToolDescriptor>, ToolInvokeError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_DISCOVERY_PAGES {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let page = self
                .transport
                .request("tools/list", params, timeout)
                .await
                .map_err(|err| match err {
                    ToolInvokeError::Rpc { message, .. } => self.discovery_error(message),
                    other => self.startup_error(other),
                })?;

            let entries = page
                .get("tools")
                .and_then(Value::as_array)
                .ok_or_else(|| self.discovery_error("response has no 'tools' array"))?;
            for entry in entries {
                tools.push(self.parse_descriptor(entry)?);
            }

            cursor = page
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|next| !next.is_empty())
                .map(String::from);
            if cursor.is_none() {
                break;
            }
        }

        if cursor.is_some() {
            warn!(
                server = %self.spec.identifier,
                pages = MAX_DISCOVERY_PAGES,
                "tool listing did not terminate; using the tools received so far"
            );
        }
        if tools.is_empty() {
            return Err(self.discovery_error("server exposes no tools"));
        }
        Ok(tools)
    }

    fn parse_descriptor(&self, entry: &Value) -> Result<ToolDescriptor, ToolInvokeError> {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| self.discovery_error("tool entry without a name"))?;

        let input_schema = match entry.get("inputSchema") {
            None | Some(Value::Null) => json!({ "type": "object", "properties": {} }),
            Some(schema @ Value::Object(_)) => schema.clone(),
            Some(_) => {
                return Err(self.discovery_error(format!(
                    "tool '{name}' has a non-object inputSchema"
                )));
            }
        };

        Ok(ToolDescriptor {
            name: name.to_string(),
            description: entry
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input_schema,
            owner: self.spec.identifier.clone(),
        })
    }

    pub fn spec(&self) -> &ServerSpec {
        &self.spec
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn startup_error(&self, err: ToolInvokeError) -> ToolInvokeError {
        let reason = match err {
            ToolInvokeError::Startup { .. } | ToolInvokeError::Spawn { .. } => return err,
            ToolInvokeError::Timeout { method, timeout, .. } => {
                format!("no answer to '{method}' within {timeout:?}")
            }
            ToolInvokeError::Terminated { .. } => "server exited during startup".to_string(),
            other => other.to_string(),
        };
        ToolInvokeError::Startup {
            server: self.spec.identifier.clone(),
            reason,
        }
    }

    fn discovery_error(&self, reason: impl Into<String>) -> ToolInvokeError {
        ToolInvokeError::Discovery {
            server: self.spec.identifier.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ToolConnection for McpConnection {
    fn id(&self) -> &str {
        &self.spec.identifier
    }

    fn state(&self) -> ConnectionState {
        let state = ConnectionState::from_u8(self.state.load(Ordering::SeqCst));
        if state == ConnectionState::Ready && !self.transport.is_alive() {
            return ConnectionState::Failed;
        }
        state
    }

    fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<String, ToolInvokeError> {
        if self.state() != ConnectionState::Ready {
            return Err(ToolInvokeError::Terminated {
                server: self.spec.identifier.clone(),
            });
        }

        let params = json!({ "name": name, "arguments": arguments });
        let result = match self.transport.request("tools/call", params, timeout).await {
            Ok(result) => result,
            Err(err) => {
                if err.is_connection_lost() {
                    self.set_state(ConnectionState::Failed);
                }
                return Err(err);
            }
        };

        let text = render_content(&result);
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(ToolInvokeError::ToolFailed {
                server: self.spec.identifier.clone(),
                tool: name.to_string(),
                message: text,
            });
        }
        Ok(text)
    }

    async fn close(&self) -> Result<(), ToolInvokeError> {
        let previous = self.state.swap(ConnectionState::Closed as u8, Ordering::SeqCst);
        if ConnectionState::from_u8(previous) == ConnectionState::Closed {
            return Ok(());
        }
        debug!(server = %self.spec.identifier, "closing MCP server connection");
        self.transport.shutdown().await
    }
}

/// Flatten a `tools/call` result into the text the model sees.
fn render_content(result: &Value) -> String {
    if let Some(items) = result.get("content").and_then(Value::as_array) {
        let parts: Vec<String> = items
            .iter()
            .map(|item| match (item.get("type").and_then(Value::as_str), item.get("text")) {
                (Some("text"), Some(Value::String(text))) => text.clone(),
                _ => item.to_string(),
            })
            .collect();
        if !parts.is_empty() {
            return parts.join("\n");
        }
    }
    match result.get("structuredContent") {
        Some(structured) => structured.to_string(),
        None if result.is_object() => String::new(),
        None => result.to_string(),
    }
}

/// Connector for real servers: stdio subprocesses or streamable-HTTP endpoints.
#[derive(Debug, Clone)]
pub struct McpConnector {
    startup_timeout: Duration,
}

impl McpConnector {
    pub fn new(startup_timeout: Duration) -> Self {
        Self { startup_timeout }
    }
}

#[async_trait]
impl ServerConnector for McpConnector {
    async fn connect(&self, spec: &ServerSpec) -> Result<Arc<dyn ToolConnection>, ToolInvokeError> {
        let connection = McpConnection::start(spec.clone(), self.startup_timeout).await?;
        Ok(Arc::new(connection))
    }
}

/// Arguments as sent on the wire: a JSON object, with `null` read as no arguments.
pub(crate) fn normalize_arguments(tool: &str, arguments: &Value) -> Result<Value, ToolInvokeError> {
    let invalid = |reason: String| ToolInvokeError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    };
    match arguments {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(arguments.clone()),
        Value::String(raw) if raw.trim().is_empty() => Ok(Value::Object(Map::new())),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ Value::Object(_)) => Ok(parsed),
            Ok(_) => Err(invalid("arguments must be a JSON object".into())),
            Err(err) => Err(invalid(format!("arguments are not valid JSON: {err}"))),
        },
        _ => Err(invalid("arguments must be a JSON object".into())),
    }
}
