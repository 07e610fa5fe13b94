use mcpeval_core::application::{CancellationSignal, EvaluationPlan, run_evaluation};
use mcpeval_core::config::{AppConfig, ServerSpec};
use mcpeval_core::constants::DEFAULT_OUTPUT_PATH;
use mcpeval_core::infrastructure::model::DynamicModelProvider;
use mcpeval_core::load_tasks;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::Cli;

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    info!("Starting mcpeval");
    debug!(config = ?cli.config, tasks = %cli.tasks.display(), "CLI arguments parsed");

    let mut config = AppConfig::load(cli.config.as_deref())?;
    apply_overrides(&cli, &mut config)?;

    let tasks = load_tasks(&cli.tasks)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH));

    let provider = DynamicModelProvider::from_configs(&config.providers, config.eval.model_timeout());

    let mut plan = EvaluationPlan::from_config(&config, tasks, output);
    plan.runner.force_rerun = cli.force_rerun;
    plan.runner.retry_errors = cli.retry_errors;

    let cancel = CancellationSignal::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing in-flight tasks and stopping");
            interrupt.cancel();
        }
    });

    let report = run_evaluation(plan, Arc::new(provider), &cancel).await?;

    for failure in &report.startup_failures {
        println!("server not started: {failure}");
    }
    for tool in &report.shadowed {
        println!(
            "tool '{}' from '{}' hidden by '{}'",
            tool.name, tool.dropped_owner, tool.kept_owner
        );
    }
    println!("{}", report.summary);
    Ok(())
}

/// Fold command-line flags over the loaded configuration.
fn apply_overrides(cli: &Cli, config: &mut AppConfig) -> Result<(), Box<dyn Error>> {
    if let Some(provider) = &cli.provider {
        if config.provider(provider).is_none() {
            return Err(format!("provider '{provider}' is not configured").into());
        }
        config.default_provider = provider.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    let default_provider = config.default_provider.clone();
    let model = config.model.clone();
    if let Some(provider) = config
        .providers
        .iter_mut()
        .find(|provider| provider.id == default_provider)
    {
        provider.ensure_model(&model);
    }

    if !cli.servers.is_empty() {
        config.servers = cli
            .servers
            .iter()
            .map(|spec| ServerSpec::parse(spec))
            .collect::<Result<Vec<_>, _>>()?;
        info!(servers = config.servers.len(), "Using servers from the command line");
    }
    if let Some(max_turns) = cli.max_turns {
        config.eval.max_turns = max_turns;
    }
    if let Some(concurrency) = cli.concurrency {
        config.eval.concurrency = concurrency;
    }
    if let Some(secs) = cli.tool_timeout {
        config.eval.tool_timeout_secs = secs;
    }
    if let Some(system) = &cli.system {
        config.system_prompt = Some(system.clone());
    }
    config.eval.validate()?;

    debug!(
        provider = %config.default_provider,
        model = %config.model,
        max_turns = config.eval.max_turns,
        concurrency = config.eval.concurrency,
        tool_timeout = ?config.eval.tool_timeout(),
        model_timeout = ?config.eval.model_timeout(),
        "Effective run settings"
    );
    Ok(())
}

pub fn init_tracing(verbose: bool) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let default = if verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .with_writer(std::io::stderr)
            .init();
    });
}
