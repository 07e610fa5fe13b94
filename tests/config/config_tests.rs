// Config tests - loading mcpeval.toml from disk and turning it into run settings.

use mcpeval_core::application::EvaluationPlan;
use mcpeval_core::config::{AppConfig, ConfigError, ServerTransport};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("mcpeval.toml");
    fs::write(&path, content).expect("Failed to write config");
    path
}

#[test]
fn returns_error_when_file_not_found() {
    let result = AppConfig::load(Some(Path::new("/nonexistent/path/mcpeval.toml")));
    assert!(matches!(result, Err(ConfigError::NotFound { .. })));
}

#[test]
fn returns_error_when_no_providers() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        r#"
default_provider = "local"
model = "llama3.1"
"#,
    );
    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::NoProvidersConfigured)
    ));
}

#[test]
fn rejects_zero_concurrency() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        r#"
default_provider = "local"
model = "llama3.1"

[[providers]]
id = "local"
type = "ollama"
endpoint = "http://127.0.0.1:11434"

[eval]
concurrency = 0
"#,
    );
    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::InvalidEval { field: "concurrency", .. })
    ));
}

#[test]
#[serial]
fn full_config_becomes_an_evaluation_plan() {
    unsafe {
        env::set_var("MCPEVAL_IT_SERVERS", "/opt/servers");
    }
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        r#"
default_provider = "local"
model = "qwen3"
system_prompt = "Use the tools."

[[providers]]
id = "local"
type = "ollama"
endpoint = "http://127.0.0.1:11434"

[[servers]]
name = "weather"
command = "${MCPEVAL_IT_SERVERS}/weather.py"
env = { UNITS = "metric" }

[[servers]]
name = "search"
url = "https://search.example.com/mcp"

[eval]
max_turns = 6
concurrency = 2
tool_timeout_secs = 15
startup_timeout_secs = 5
"#,
    );

    let config = AppConfig::load(Some(&path)).expect("config loads");
    unsafe {
        env::remove_var("MCPEVAL_IT_SERVERS");
    }

    assert_eq!(config.servers[0].target, "/opt/servers/weather.py");
    assert_eq!(config.servers[0].env.get("UNITS").map(String::as_str), Some("metric"));
    assert_eq!(config.servers[1].transport, ServerTransport::Http);

    let plan = EvaluationPlan::from_config(&config, Vec::new(), dir.path().join("out.jsonl"));
    assert_eq!(plan.engine.max_turns, 6);
    assert_eq!(plan.engine.tool_timeout, Duration::from_secs(15));
    assert_eq!(plan.engine.system_prompt.as_deref(), Some("Use the tools."));
    assert_eq!(plan.runner.concurrency, 2);
    assert_eq!(plan.startup_timeout, Duration::from_secs(5));
    assert!(config.provider("local").expect("provider").models.iter().any(|m| m.name == "qwen3"));
}
