//! # Task Runner
//!
//! Batch orchestration over a task list. Tasks already on the run ledger are
//! skipped, the rest go through a bounded pool of workers sharing one
//! [`ConversationEngine`](crate::application::engine::ConversationEngine), and
//! every finished trajectory is appended to the ledger through a single writer
//! before the next task is picked up.

mod errors;
mod ledger;
mod summary;
mod task_runner;
mod tasks;

pub use errors::{LedgerError, RunnerError};
pub use ledger::{LedgerTask, LedgerWriter, RunLedger, read_trajectories};
pub use summary::RunSummary;
pub use task_runner::{RunnerOptions, TaskRunner};
pub use tasks::load_tasks;
