use futures::future::join_all;
use std::any::Any;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::errors::{LedgerError, RunnerError};
use super::ledger::{LedgerWriter, RunLedger};
use super::summary::RunSummary;
use crate::application::cancel::CancellationSignal;
use crate::application::engine::{ConversationEngine, EngineError};
use crate::config::EvalConfig;
use crate::domain::{Task, Trajectory, TrajectoryStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Upper bound on tasks in flight at once.
    pub concurrency: usize,
    /// Ignore the ledger and run every task again.
    pub force_rerun: bool,
    /// Rerun tasks whose latest record ended in `error`.
    pub retry_errors: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            force_rerun: false,
            retry_errors: false,
        }
    }
}

impl RunnerOptions {
    pub fn from_config(eval: &EvalConfig) -> Self {
        Self {
            concurrency: eval.concurrency,
            ..Self::default()
        }
    }
}

/// What one worker did before it ran out of tasks.
#[derive(Default)]
struct WorkerReport {
    statuses: Vec<TrajectoryStatus>,
    ledger_error: Option<LedgerError>,
}

/// Batch orchestration over a task list sharing one conversation engine.
pub struct TaskRunner {
    engine: Arc<ConversationEngine>,
    options: RunnerOptions,
}

impl TaskRunner {
    pub fn new(engine: Arc<ConversationEngine>, options: RunnerOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Run every task not already on the ledger at `output`, appending each
    /// trajectory as soon as it finishes.
    pub async fn run(
        &self,
        tasks: Vec<Task>,
        output: &Path,
        cancel: &CancellationSignal,
    ) -> Result<RunSummary, RunnerError> {
        let mut summary = RunSummary::new(tasks.len());
        let ledger = RunLedger::load(output).await?;

        let pending: VecDeque<Task> = tasks
            .into_iter()
            .filter(|task| self.should_run(&ledger, task))
            .collect();
        summary.skipped = summary.total - pending.len();
        if summary.skipped > 0 {
            info!(
                skipped = summary.skipped,
                output = %output.display(),
                "Resuming: tasks already on the ledger are skipped"
            );
        }
        if pending.is_empty() {
            info!(%summary, "Nothing to run");
            return Ok(summary);
        }

        let scheduled = pending.len();
        let workers = self.options.concurrency.max(1).min(scheduled);
        info!(tasks = scheduled, workers, output = %output.display(), "Starting task run");

        let (writer, writer_task) = LedgerWriter::open(output).await?;
        let queue = Mutex::new(pending);
        let halt = AtomicBool::new(false);

        let reports = join_all(
            (0..workers).map(|worker| self.work(worker, &queue, &writer, &halt, cancel)),
        )
        .await;
        drop(writer);
        writer_task.finish().await;

        let mut first_error = None;
        for report in reports {
            for status in report.statuses {
                summary.record(status);
            }
            if first_error.is_none() {
                first_error = report.ledger_error;
            }
        }
        if let Some(err) = first_error {
            return Err(err.into());
        }

        summary.cancelled = scheduled - summary.executed();
        if summary.cancelled > 0 {
            warn!(cancelled = summary.cancelled, "Run interrupted; unfinished tasks stay pending for the next run");
        }
        info!(%summary, "Task run finished");
        Ok(summary)
    }

    fn should_run(&self, ledger: &RunLedger, task: &Task) -> bool {
        if self.options.force_rerun {
            return true;
        }
        match ledger.status(&task.id) {
            None => true,
            Some(TrajectoryStatus::Error) if self.options.retry_errors => {
                debug!(task_id = %task.id, "Retrying task whose last run errored");
                true
            }
            Some(_) => false,
        }
    }

    async fn work(
        &self,
        worker: usize,
        queue: &Mutex<VecDeque<Task>>,
        writer: &LedgerWriter,
        halt: &AtomicBool,
        cancel: &CancellationSignal,
    ) -> WorkerReport {
        let mut report = WorkerReport::default();

        loop {
            if cancel.is_cancelled() || halt.load(Ordering::SeqCst) {
                break;
            }
            let Some(task) = queue.lock().await.pop_front() else {
                break;
            };
            debug!(worker, task_id = %task.id, "Worker picked up task");

            let Some(trajectory) = self.execute(&task, cancel).await else {
                continue;
            };
            let status = trajectory.status;
            match writer.append(&trajectory).await {
                Ok(()) => {
                    debug!(task_id = %task.id, status = status.as_str(), "Trajectory appended to ledger");
                    report.statuses.push(status);
                }
                Err(err) => {
                    error!(task_id = %task.id, %err, "Failed to persist trajectory; stopping the run");
                    halt.store(true, Ordering::SeqCst);
                    report.ledger_error = Some(err);
                    break;
                }
            }
        }

        report
    }

    /// Run one task on its own tokio task so a panic only costs that task.
    /// `None` means the run was cancelled and nothing should be persisted.
    async fn execute(&self, task: &Task, cancel: &CancellationSignal) -> Option<Trajectory> {
        let engine = Arc::clone(&self.engine);
        let signal = cancel.clone();
        let owned = task.clone();
        let joined = tokio::spawn(async move { engine.run(&owned, &signal).await }).await;

        let options = self.engine.options();
        match joined {
            Ok(Ok(trajectory)) => Some(trajectory),
            Ok(Err(EngineError::Cancelled)) => {
                info!(task_id = %task.id, "Task interrupted by cancellation; not persisted");
                None
            }
            Ok(Err(err)) => Some(Trajectory::failed(
                task,
                &options.provider,
                &options.model,
                err.to_string(),
            )),
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    format!("task panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    "task was aborted".to_string()
                };
                error!(task_id = %task.id, %message, "Task failed outside the conversation engine");
                Some(Trajectory::failed(
                    task,
                    &options.provider,
                    &options.model,
                    message,
                ))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
