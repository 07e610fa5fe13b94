//! Provider factory - creates clients from config

use super::clients::{OllamaClient, OpenAIClient};
use super::traits::ModelClient;
use crate::config::ModelProviderConfig;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolve an API key setting.
///
/// The setting names an environment variable when one by that name exists;
/// otherwise it is taken as the key itself. An unset variable whose name looks
/// like one (`UPPER_SNAKE`) resolves to nothing.
pub fn resolve_api_key(provider: &str, spec: Option<&str>) -> Option<String> {
    let raw = spec.map(str::trim)?;
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = env::var(raw) {
        debug!(provider, env_var = raw, "API key resolved from environment");
        return Some(value);
    }
    if looks_like_env_var(raw) {
        warn!(
            provider,
            env_var = raw,
            "API key environment variable is not set"
        );
        return None;
    }
    Some(raw.to_string())
}

fn looks_like_env_var(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        && value.chars().any(|c| c.is_ascii_uppercase())
}

/// Factory for creating model clients from provider config.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Creates a model client based on provider type.
    ///
    /// Supported types:
    /// - `ollama` → Ollama `/api/chat`
    /// - Others → OpenAI-compatible format (default)
    ///
    /// `timeout` caps every HTTP request the client makes.
    pub fn create(config: &ModelProviderConfig, timeout: Duration) -> Box<dyn ModelClient> {
        if config.is_ollama() {
            Box::new(OllamaClient::from_config(config, timeout))
        } else {
            Box::new(OpenAIClient::from_config(config, timeout))
        }
    }
}
