//! Model types - Request, Response, and Error types

use crate::domain::{ChatMessage, TokenUsage, ToolCallRequest, ToolDescriptor};
use reqwest::StatusCode;
use thiserror::Error;

/// Model request for one assistant turn
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub provider: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call, already merged across servers
    pub tools: Vec<ToolDescriptor>,
    pub temperature: Option<f32>,
}

/// Model response: an assistant message with zero or more tool calls
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: ChatMessage,
    pub usage: Option<TokenUsage>,
}

impl ModelResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            message: ChatMessage::assistant(content, Vec::new()),
            usage: None,
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            message: ChatMessage::assistant(content, tool_calls),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Model errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("provider '{provider}' is not configured")]
    ProviderNotFound { provider: String },
    #[error("model '{model}' is not available for provider '{provider}'")]
    ModelNotFound { provider: String, model: String },
    #[error("provider '{provider}' requires an API key")]
    MissingApiKey { provider: String },
    #[error("network error calling provider '{provider}': {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("provider '{provider}' returned invalid response: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl ModelError {
    pub fn provider_not_found(provider: impl Into<String>) -> Self {
        Self::ProviderNotFound {
            provider: provider.into(),
        }
    }

    pub fn model_not_found(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::ModelNotFound {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn missing_api_key(provider: impl Into<String>) -> Self {
        Self::MissingApiKey {
            provider: provider.into(),
        }
    }

    pub fn network(provider: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            provider: provider.into(),
            source,
        }
    }

    pub fn invalid_response(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Transport failures, rate limits, server errors and malformed bodies are
    /// transient; configuration problems and other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Network { source, .. } => match source.status() {
                Some(status) => {
                    status == StatusCode::REQUEST_TIMEOUT
                        || status == StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error()
                }
                None => true,
            },
            ModelError::InvalidResponse { .. } => true,
            ModelError::ProviderNotFound { .. }
            | ModelError::ModelNotFound { .. }
            | ModelError::MissingApiKey { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_not_retryable() {
        assert!(!ModelError::missing_api_key("openai").is_retryable());
        assert!(!ModelError::provider_not_found("x").is_retryable());
        assert!(!ModelError::model_not_found("openai", "gpt-x").is_retryable());
        assert!(ModelError::invalid_response("openai", "missing choices").is_retryable());
    }
}
