use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::error::ToolInvokeError;

/// Correlated JSON-RPC exchange with one server over some transport.
#[async_trait]
pub(crate) trait RpcTransport: Send + Sync {
    /// Send a request and wait up to `timeout` for the response carrying its id.
    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ToolInvokeError>;

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolInvokeError>;

    /// False once the peer is gone (process exit, stream EOF, refused connection).
    fn is_alive(&self) -> bool;

    async fn shutdown(&self) -> Result<(), ToolInvokeError>;
}
