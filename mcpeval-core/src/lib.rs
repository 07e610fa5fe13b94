//! Multi-server MCP tool-use evaluation.
//!
//! A run starts every configured MCP server, merges their tools behind one
//! [`ToolRouter`](application::tooling::ToolRouter), drives each task through a
//! model-and-tools conversation and appends the resulting trajectory to a
//! resumable JSON Lines ledger.

pub mod application;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;

pub use application::engine::{ConversationEngine, EngineError, EngineOptions, RetryPolicy};
pub use application::runner::{RunSummary, RunnerError, RunnerOptions, TaskRunner, load_tasks};
pub use application::tooling::{ServerPool, ToolInvokeError, ToolRouter};
pub use application::{CancellationSignal, EvaluationError, EvaluationPlan, RunReport, run_evaluation};
pub use config::{AppConfig, ConfigError, ServerSpec};
pub use domain::{Task, Trajectory, TrajectoryStatus};
pub use infrastructure::model::{DynamicModelProvider, ModelProvider};
