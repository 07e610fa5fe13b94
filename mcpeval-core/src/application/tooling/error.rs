use std::time::Duration;
use thiserror::Error;

use crate::domain::ToolErrorKind;

#[derive(Debug, Error)]
pub enum ToolInvokeError {
    #[error("failed to spawn MCP server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("MCP server '{server}' failed to start: {reason}")]
    Startup { server: String, reason: String },
    #[error("MCP server '{server}' returned a malformed tool list: {reason}")]
    Discovery { server: String, reason: String },
    #[error("tool '{tool}' is not provided by any connected server")]
    UnknownTool { tool: String },
    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("MCP server '{server}' did not answer '{method}' within {timeout:?}")]
    Timeout {
        server: String,
        method: String,
        timeout: Duration,
    },
    #[error("MCP server '{server}' transport error: {message}")]
    Transport { server: String, message: String },
    #[error("MCP server '{server}' returned invalid JSON: {source}")]
    InvalidJson {
        server: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("MCP server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },
    #[error("tool '{tool}' on MCP server '{server}' reported an error: {message}")]
    ToolFailed {
        server: String,
        tool: String,
        message: String,
    },
    #[error("MCP server '{server}' terminated unexpectedly")]
    Terminated { server: String },
    #[error("MCP server '{server}' request cancelled")]
    Cancelled { server: String },
}

impl ToolInvokeError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolInvokeError::Spawn { .. } | ToolInvokeError::Startup { .. } => {
                ToolErrorKind::Startup
            }
            ToolInvokeError::Discovery { .. } => ToolErrorKind::Discovery,
            ToolInvokeError::UnknownTool { .. } => ToolErrorKind::UnknownTool,
            ToolInvokeError::InvalidArguments { .. } => ToolErrorKind::InvalidArguments,
            ToolInvokeError::Timeout { .. } => ToolErrorKind::Timeout,
            ToolInvokeError::Transport { .. } | ToolInvokeError::Terminated { .. } => {
                ToolErrorKind::ConnectionLost
            }
            ToolInvokeError::InvalidJson { .. }
            | ToolInvokeError::Rpc { .. }
            | ToolInvokeError::ToolFailed { .. } => ToolErrorKind::RemoteFailure,
            ToolInvokeError::Cancelled { .. } => ToolErrorKind::Cancelled,
        }
    }

    pub fn is_connection_lost(&self) -> bool {
        self.kind() == ToolErrorKind::ConnectionLost
    }
}
