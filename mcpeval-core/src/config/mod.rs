pub mod app;
pub mod error;
pub mod eval;
pub mod loader;
pub mod provider;
pub mod server;

pub use app::AppConfig;
pub use error::{ConfigError, ServerSpecError};
pub use eval::EvalConfig;
pub use provider::{ModelInfo, ModelProviderConfig};
pub use server::{LaunchCommand, ServerSpec, ServerTransport};
