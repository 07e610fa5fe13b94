use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::error::ToolInvokeError;
use crate::config::ServerSpec;
use crate::domain::ToolDescriptor;

/// Lifecycle of one server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    Starting = 0,
    Ready = 1,
    Failed = 2,
    Closed = 3,
}

impl ConnectionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Starting,
            1 => ConnectionState::Ready,
            2 => ConnectionState::Failed,
            _ => ConnectionState::Closed,
        }
    }
}

/// A live connection to one tool server.
#[async_trait]
pub trait ToolConnection: Send + Sync {
    fn id(&self) -> &str;

    fn state(&self) -> ConnectionState;

    /// Tools found by the single discovery call; empty until discovery succeeds.
    fn tools(&self) -> &[ToolDescriptor];

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<String, ToolInvokeError>;

    /// Idempotent; safe from any state.
    async fn close(&self) -> Result<(), ToolInvokeError>;
}

/// Starts a connection for a server spec, handshake and discovery included.
#[async_trait]
pub trait ServerConnector: Send + Sync {
    async fn connect(&self, spec: &ServerSpec) -> Result<Arc<dyn ToolConnection>, ToolInvokeError>;
}
