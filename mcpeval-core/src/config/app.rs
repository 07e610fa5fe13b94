use super::error::ConfigError;
use super::eval::EvalConfig;
use super::provider::ModelProviderConfig;
use super::server::ServerSpec;
use std::path::Path;

/// Application configuration loaded from mcpeval.toml
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub default_provider: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub providers: Vec<ModelProviderConfig>,
    pub servers: Vec<ServerSpec>,
    pub eval: EvalConfig,
}

impl AppConfig {
    /// Load configuration from a file path (or default path if None)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        super::loader::load_config(path)
    }

    pub fn provider(&self, id: &str) -> Option<&ModelProviderConfig> {
        self.providers.iter().find(|provider| provider.id == id)
    }
}
