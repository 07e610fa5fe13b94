use super::error::ToolInvokeError;
use super::transport::RpcTransport;
use crate::config::ServerSpec;
use crate::constants::SHUTDOWN_GRACE_MS;
use crate::infrastructure::rpc::{Inbound, RpcRequest, RpcResponse};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, info, warn};

type Responder = oneshot::Sender<Result<Value, ToolInvokeError>>;

/// Newline-delimited JSON-RPC over a child process's stdin/stdout.
pub(crate) struct StdioTransport {
    server: String,
    child: AsyncMutex<Option<Child>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: AsyncMutex<HashMap<String, Responder>>,
    id_counter: AtomicU64,
    alive: AtomicBool,
    closing: AtomicBool,
}

impl StdioTransport {
    /// Spawn the server process and start its reader tasks.
    ///
    /// The reader only holds a weak reference, so dropping the last handle drops the
    /// child, and `kill_on_drop` takes the process down with it.
    pub(crate) fn spawn(spec: &ServerSpec) -> Result<Arc<Self>, ToolInvokeError> {
        let launch = spec.launch_command();
        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.workdir {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| ToolInvokeError::Spawn {
            server: spec.identifier.clone(),
            source,
        })?;

        let transport_error = |message: &str| ToolInvokeError::Transport {
            server: spec.identifier.clone(),
            message: message.to_string(),
        };
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| transport_error("failed to capture server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transport_error("failed to capture server stdout"))?;
        let stderr = child.stderr.take();

        info!(
            server = %spec.identifier,
            program = %launch.program,
            pid = ?child.id(),
            "Spawned MCP server process"
        );

        let transport = Arc::new(Self {
            server: spec.identifier.clone(),
            child: AsyncMutex::new(Some(child)),
            writer: AsyncMutex::new(Some(BufWriter::new(stdin))),
            pending: AsyncMutex::new(HashMap::new()),
            id_counter: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            closing: AtomicBool::new(false),
        });

        tokio::spawn(reader_loop(Arc::downgrade(&transport), stdout));
        if let Some(stderr) = stderr {
            tokio::spawn(forward_stderr(spec.identifier.clone(), stderr));
        }
        Ok(transport)
    }

    async fn handle_line(&self, raw: &str) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        if trimmed.starts_with('\u{1b}') {
            debug!(
                server = %self.server,
                line = trimmed,
                "skipping non-JSON ANSI log line from MCP server"
            );
            return;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                if let Err(err) = self.process_inbound_message(value).await {
                    warn!(
                        server = %self.server,
                        %err,
                        "failed to process message from MCP server"
                    );
                }
            }
            Err(source) => {
                warn!(
                    server = %self.server,
                    line = trimmed,
                    %source,
                    "received invalid JSON from MCP server"
                );
            }
        }
    }

    async fn process_inbound_message(&self, value: Value) -> Result<(), ToolInvokeError> {
        match Inbound::classify(value) {
            Inbound::Response { key, response } => {
                self.handle_response(key, response).await;
                Ok(())
            }
            Inbound::Request { id, method } => self.handle_server_request(id, &method).await,
            Inbound::Notification { method } => {
                if method == "notifications/tools/list_changed" {
                    info!(
                        server = %self.server,
                        "server changed its tool list; the routing table stays as discovered"
                    );
                } else {
                    debug!(server = %self.server, method, "received notification from server");
                }
                Ok(())
            }
            Inbound::Ignored => Ok(()),
        }
    }

    async fn handle_response(&self, key: String, response: RpcResponse) {
        let responder = {
            let mut pending = self.pending.lock().await;
            pending.remove(&key)
        };

        let Some(sender) = responder else {
            debug!(
                server = %self.server,
                response_id = key,
                "received response for unknown or expired request"
            );
            return;
        };
        let outcome = response
            .into_result()
            .map_err(|error| ToolInvokeError::Rpc {
                server: self.server.clone(),
                code: error.code,
                message: error.message,
            });
        let _ = sender.send(outcome);
    }

    async fn handle_server_request(&self, id: Value, method: &str) -> Result<(), ToolInvokeError> {
        let response = match method {
            "ping" => RpcResponse::success(Some(id), json!({})),
            other => {
                warn!(
                    server = %self.server,
                    method = other,
                    "server sent unsupported request"
                );
                RpcResponse::method_not_found(Some(id), other)
            }
        };
        self.write_message(&response).await
    }

    async fn write_message<T: Serialize>(&self, message: &T) -> Result<(), ToolInvokeError> {
        let mut encoded =
            serde_json::to_string(message).map_err(|source| ToolInvokeError::InvalidJson {
                server: self.server.clone(),
                source,
            })?;
        encoded.push('\n');

        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or_else(|| self.terminated())?;
        let written = async {
            stream.write_all(encoded.as_bytes()).await?;
            stream.flush().await
        }
        .await;
        written.map_err(|source| match source.kind() {
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => self.terminated(),
            _ => ToolInvokeError::Transport {
                server: self.server.clone(),
                message: source.to_string(),
            },
        })
    }

    /// Peer went away: reap the child and release every waiter with `Terminated`.
    async fn on_disconnect(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.writer.lock().await.take();

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            match child.try_wait() {
                Ok(Some(status)) => warn!(
                    server = %self.server,
                    %status,
                    "MCP server process exited"
                ),
                Ok(None) => {
                    warn!(server = %self.server, "MCP server closed stdout; killing process");
                    if let Err(err) = child.kill().await {
                        debug!(
                            server = %self.server,
                            %err,
                            "failed to kill MCP server process (may have already exited)"
                        );
                    }
                }
                Err(err) => debug!(server = %self.server, %err, "failed to poll MCP server exit"),
            }
        } else {
            debug!(server = %self.server, "MCP server stream closed after shutdown");
        }

        self.fail_all_pending().await;
    }

    async fn fail_all_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(self.terminated()));
        }
    }

    fn next_id(&self) -> String {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("req-{id}")
    }

    fn terminated(&self) -> ToolInvokeError {
        ToolInvokeError::Terminated {
            server: self.server.clone(),
        }
    }
}

#[async_trait]
impl RpcTransport for StdioTransport {
    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ToolInvokeError> {
        if !self.is_alive() {
            return Err(self.terminated());
        }

        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        let payload = RpcRequest::request(id.clone(), method, params);
        if let Err(err) = self.write_message(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ToolInvokeError::Cancelled {
                server: self.server.clone(),
            }),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(server = %self.server, method, request_id = %id, ?timeout, "MCP request timed out");
                let cancel = json!({ "requestId": id, "reason": "client timeout" });
                if let Err(err) = self.notify("notifications/cancelled", cancel).await {
                    debug!(server = %self.server, %err, "failed to send cancellation notice");
                }
                Err(ToolInvokeError::Timeout {
                    server: self.server.clone(),
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolInvokeError> {
        self.write_message(&RpcRequest::notification(method, params))
            .await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.closing.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<(), ToolInvokeError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Closing stdin is the stdio transport's shutdown signal.
        self.writer.lock().await.take();

        let child = self.child.lock().await.take();
        let result = match child {
            Some(mut child) => {
                let grace = Duration::from_millis(SHUTDOWN_GRACE_MS);
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(Ok(status)) => {
                        debug!(server = %self.server, %status, "MCP server exited after stdin closed");
                        Ok(())
                    }
                    Ok(Err(source)) => Err(ToolInvokeError::Transport {
                        server: self.server.clone(),
                        message: source.to_string(),
                    }),
                    Err(_) => {
                        debug!(server = %self.server, "MCP server ignored stdin close; killing");
                        child
                            .kill()
                            .await
                            .map_err(|source| ToolInvokeError::Transport {
                                server: self.server.clone(),
                                message: source.to_string(),
                            })
                    }
                }
            }
            None => Ok(()),
        };

        self.alive.store(false, Ordering::SeqCst);
        self.fail_all_pending().await;
        result
    }
}

async fn reader_loop(transport: Weak<StdioTransport>, stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(raw)) = lines.next_line().await {
        let Some(transport) = transport.upgrade() else {
            return;
        };
        transport.handle_line(&raw).await;
    }

    if let Some(transport) = transport.upgrade() {
        transport.on_disconnect().await;
    }
}

async fn forward_stderr(server: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end();
        if !line.is_empty() {
            debug!(server = %server, line, "MCP server stderr");
        }
    }
}
