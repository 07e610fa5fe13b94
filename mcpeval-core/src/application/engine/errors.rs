use thiserror::Error;

use crate::infrastructure::model::ModelError;

/// Why a conversation stopped short of a final answer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model provider failed after {attempts} attempt(s): {source}")]
    Provider {
        attempts: u32,
        #[source]
        source: ModelError,
    },
    #[error("tool '{tool}' lost its connection to MCP server '{server}'")]
    ConnectionLost { server: String, tool: String },
    #[error("run cancelled before the task finished")]
    Cancelled,
}
