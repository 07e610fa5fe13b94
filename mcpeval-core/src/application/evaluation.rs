use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::cancel::CancellationSignal;
use super::engine::{ConversationEngine, EngineOptions};
use super::runner::{RunSummary, RunnerError, RunnerOptions, TaskRunner};
use super::tooling::{McpConnector, PoolError, ServerConnector, ServerPool, ShadowedTool, StartupFailure};
use crate::config::{AppConfig, ServerSpec};
use crate::domain::Task;
use crate::infrastructure::model::ModelProvider;

/// Everything one evaluation run needs besides the model provider.
#[derive(Debug, Clone)]
pub struct EvaluationPlan {
    pub servers: Vec<ServerSpec>,
    pub tasks: Vec<Task>,
    pub output: PathBuf,
    pub engine: EngineOptions,
    pub runner: RunnerOptions,
    pub startup_timeout: Duration,
}

impl EvaluationPlan {
    /// Plan over the configured servers; CLI overrides are applied by the caller.
    pub fn from_config(config: &AppConfig, tasks: Vec<Task>, output: impl Into<PathBuf>) -> Self {
        Self {
            servers: config.servers.clone(),
            tasks,
            output: output.into(),
            engine: EngineOptions::from_config(config),
            runner: RunnerOptions::from_config(&config.eval),
            startup_timeout: config.eval.startup_timeout(),
        }
    }
}

/// Run summary plus the startup problems the operator should see.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub startup_failures: Vec<StartupFailure>,
    pub shadowed: Vec<ShadowedTool>,
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Start the servers, run every task against them, then tear the servers down.
pub async fn run_evaluation(
    plan: EvaluationPlan,
    provider: Arc<dyn ModelProvider>,
    cancel: &CancellationSignal,
) -> Result<RunReport, EvaluationError> {
    let connector = McpConnector::new(plan.startup_timeout);
    run_evaluation_with(plan, provider, &connector, cancel).await
}

pub async fn run_evaluation_with(
    plan: EvaluationPlan,
    provider: Arc<dyn ModelProvider>,
    connector: &dyn ServerConnector,
    cancel: &CancellationSignal,
) -> Result<RunReport, EvaluationError> {
    let pool = ServerPool::build_with(&plan.servers, connector).await?;
    let startup_failures = pool.failures().to_vec();
    let shadowed = pool.router().shadowed().to_vec();
    for failure in &startup_failures {
        warn!(server = %failure.server, kind = %failure.kind, "Continuing without server");
    }

    let engine = ConversationEngine::new(provider, pool.router(), plan.engine);
    let runner = TaskRunner::new(Arc::new(engine), plan.runner);
    let outcome = runner.run(plan.tasks, &plan.output, cancel).await;

    let close_errors = pool.teardown().await;
    if !close_errors.is_empty() {
        warn!(errors = close_errors.len(), "Some MCP servers did not close cleanly");
    }

    let summary = outcome?;
    info!(%summary, output = %plan.output.display(), "Evaluation finished");
    Ok(RunReport {
        summary,
        startup_failures,
        shadowed,
    })
}
