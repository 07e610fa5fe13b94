use std::time::Duration;

use crate::config::AppConfig;

/// Bounded exponential backoff for model provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub provider: String,
    pub model: String,
    pub max_turns: u32,
    pub tool_timeout: Duration,
    pub retry: RetryPolicy,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub abort_on_connection_lost: bool,
}

impl EngineOptions {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            max_turns: 10,
            tool_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            system_prompt: None,
            temperature: None,
            abort_on_connection_lost: true,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let eval = &config.eval;
        Self {
            provider: config.default_provider.clone(),
            model: config.model.clone(),
            max_turns: eval.max_turns,
            tool_timeout: eval.tool_timeout(),
            retry: RetryPolicy {
                max_attempts: eval.model_max_attempts,
                initial_backoff: Duration::from_millis(eval.model_backoff_ms),
                max_backoff: Duration::from_millis(eval.model_backoff_max_ms),
            },
            system_prompt: config.system_prompt.clone(),
            temperature: eval.temperature,
            abort_on_connection_lost: eval.abort_on_connection_lost,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }
}
