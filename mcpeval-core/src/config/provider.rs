//! # Provider Configuration
//!
//! Configuration types for the model providers that drive the conversation.
//!
//! | Type | Description | API Key Required |
//! |------|-------------|-----------------|
//! | `openai` | OpenAI-compatible chat completions with function tools | Yes |
//! | `ollama` | Local Ollama server (`/api/chat` with tools) | No |

use serde::{Deserialize, Serialize};

/// Provider types understood by the client factory.
pub const SUPPORTED_PROVIDER_TYPES: &[&str] = &["openai", "ollama"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model identifier used in API calls (e.g., "gpt-4o-mini")
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Configuration for a model provider.
///
/// ```toml
/// [[providers]]
/// id = "openai"
/// type = "openai"
/// endpoint = "https://api.openai.com"
/// api_key = "OPENAI_API_KEY"
/// models = ["gpt-4o-mini"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelProviderConfig {
    pub id: String,
    /// Determines the wire format: "openai" or "ollama"
    #[serde(rename = "type")]
    pub provider_type: String,
    pub endpoint: String,
    /// Name of an environment variable holding the key, or the key itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API path override (e.g., "/openai/v1/chat/completions")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_path: Option<String>,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct RawProviderConfig {
    pub(super) id: String,
    #[serde(rename = "type", default)]
    pub(super) provider_type: String,
    pub(super) endpoint: Option<String>,
    pub(super) api_key: Option<String>,
    #[serde(default)]
    pub(super) api_path: Option<String>,
    #[serde(default)]
    pub(super) models: Vec<RawModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum RawModelInfo {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        display_name: Option<String>,
    },
}

impl From<RawModelInfo> for ModelInfo {
    fn from(value: RawModelInfo) -> Self {
        match value {
            RawModelInfo::Name(name) => Self {
                name,
                display_name: None,
            },
            RawModelInfo::Detailed { name, display_name } => Self { name, display_name },
        }
    }
}

impl From<RawProviderConfig> for ModelProviderConfig {
    fn from(raw: RawProviderConfig) -> Self {
        let expand = |s: String| -> String {
            shellexpand::env(&s)
                .map(|cow| cow.into_owned())
                .unwrap_or_else(|_| s.clone())
        };
        let provider_type = if raw.provider_type.trim().is_empty() {
            "openai".to_string()
        } else {
            raw.provider_type.trim().to_ascii_lowercase()
        };

        Self {
            id: raw.id,
            provider_type,
            endpoint: raw.endpoint.map(expand).unwrap_or_default(),
            api_key: raw.api_key.map(expand),
            api_path: raw.api_path,
            models: raw.models.into_iter().map(ModelInfo::from).collect(),
        }
    }
}

impl ModelProviderConfig {
    /// Ensure a model exists in this provider's model list
    pub fn ensure_model(&mut self, model: &str) {
        if self.models.iter().all(|info| info.name != model) {
            self.models.push(ModelInfo {
                name: model.to_string(),
                display_name: None,
            });
        }
    }

    pub fn is_ollama(&self) -> bool {
        self.provider_type.eq_ignore_ascii_case("ollama")
    }

    pub fn is_supported_type(&self) -> bool {
        SUPPORTED_PROVIDER_TYPES
            .iter()
            .any(|known| self.provider_type.eq_ignore_ascii_case(known))
    }
}
