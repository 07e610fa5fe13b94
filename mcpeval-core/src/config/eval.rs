use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ConfigError;

/// `[eval]` section: budgets and limits for a benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub max_turns: u32,
    pub concurrency: usize,
    pub tool_timeout_secs: u64,
    pub startup_timeout_secs: u64,
    /// Upper bound on one model HTTP request.
    pub model_timeout_secs: u64,
    pub model_max_attempts: u32,
    pub model_backoff_ms: u64,
    pub model_backoff_max_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// End a task as `error` once a tool call hits a server that has gone away.
    pub abort_on_connection_lost: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            concurrency: 4,
            tool_timeout_secs: 60,
            startup_timeout_secs: 30,
            model_timeout_secs: 120,
            model_max_attempts: 3,
            model_backoff_ms: 1_000,
            model_backoff_max_ms: 30_000,
            temperature: None,
            abort_on_connection_lost: true,
        }
    }
}

impl EvalConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_turns", self.max_turns as u64),
            ("concurrency", self.concurrency as u64),
            ("tool_timeout_secs", self.tool_timeout_secs),
            ("startup_timeout_secs", self.startup_timeout_secs),
            ("model_timeout_secs", self.model_timeout_secs),
            ("model_max_attempts", self.model_max_attempts as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidEval {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if self.model_backoff_max_ms < self.model_backoff_ms {
            return Err(ConfigError::InvalidEval {
                field: "model_backoff_max_ms",
                reason: "must not be smaller than model_backoff_ms".into(),
            });
        }
        Ok(())
    }
}
