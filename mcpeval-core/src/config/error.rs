use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required field 'model' in configuration")]
    MissingModel,

    #[error("missing required field 'default_provider' in configuration")]
    MissingDefaultProvider,

    #[error("no providers configured - at least one [[providers]] entry is required")]
    NoProvidersConfigured,

    #[error("default provider '{provider}' not found in configured providers")]
    ProviderNotFound { provider: String },

    #[error("provider '{provider}' is missing required field 'endpoint'")]
    MissingEndpoint { provider: String },

    #[error("provider '{provider}' has unsupported type '{provider_type}'")]
    UnknownProviderType {
        provider: String,
        provider_type: String,
    },

    #[error("server '{server}' is invalid: {reason}")]
    InvalidServer { server: String, reason: String },

    #[error("invalid [eval] setting '{field}': {reason}")]
    InvalidEval { field: &'static str, reason: String },
}

/// Errors raised while parsing a `path_or_package[:args][^env]` server string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerSpecError {
    #[error("server specification is empty")]
    Empty,
    #[error("server specification '{spec}' has no command or url")]
    MissingTarget { spec: String },
    #[error("environment entry '{entry}' must have the form KEY=value")]
    InvalidEnv { entry: String },
}
