use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to access run ledger '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode trajectory for the run ledger: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("run ledger writer stopped before the record was written")]
    WriterClosed,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("task file not found at {path}")]
    TasksNotFound { path: PathBuf },
    #[error("failed to read task file {path}: {source}")]
    TasksIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse task file {path}{}: {source}", .line.map(|l| format!(" (line {l})")).unwrap_or_default())]
    TasksParse {
        path: PathBuf,
        line: Option<usize>,
        #[source]
        source: serde_json::Error,
    },
    #[error("task id '{id}' appears more than once")]
    DuplicateTask { id: String },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
