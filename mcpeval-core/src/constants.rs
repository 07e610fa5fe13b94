//! Application constants
//!
//! Single source of truth for paths and protocol identifiers.

/// Default configuration file path
pub const CONFIG_PATH: &str = "config/mcpeval.toml";

/// Default environment file path
pub const ENV_PATH: &str = "config/.env";

/// Default run ledger path
pub const DEFAULT_OUTPUT_PATH: &str = "results/trajectories.jsonl";

/// MCP protocol revision announced during the handshake
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Grace period a stdio server gets to exit after its stdin is closed
pub const SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Chat completions path for OpenAI-compatible providers
pub const DEFAULT_OPENAI_API_PATH: &str = "/v1/chat/completions";

/// Chat path for Ollama
pub const DEFAULT_OLLAMA_API_PATH: &str = "/api/chat";
