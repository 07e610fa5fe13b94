use serde::Deserialize;
use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::errors::LedgerError;
use crate::domain::{Trajectory, TrajectoryStatus};

/// The fields resume needs; the rest of each record is left alone.
#[derive(Debug, Deserialize)]
struct LedgerEntry {
    task_id: String,
    status: TrajectoryStatus,
}

/// Latest recorded status per task id, read from an existing ledger file.
#[derive(Debug, Default)]
pub struct RunLedger {
    latest: HashMap<String, TrajectoryStatus>,
    records: usize,
    malformed: usize,
}

impl RunLedger {
    /// Read the ledger at `path`; a missing file is an empty ledger.
    pub async fn load(path: &Path) -> Result<Self, LedgerError> {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No existing run ledger");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut ledger = Self::default();
        for (index, line) in lines(&content) {
            match serde_json::from_slice::<LedgerEntry>(line) {
                Ok(entry) => {
                    ledger.records += 1;
                    ledger.latest.insert(entry.task_id, entry.status);
                }
                Err(err) => {
                    ledger.malformed += 1;
                    warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %err,
                        "Skipping malformed run ledger record"
                    );
                }
            }
        }

        info!(
            path = %path.display(),
            records = ledger.records,
            tasks = ledger.latest.len(),
            malformed = ledger.malformed,
            "Loaded run ledger"
        );
        Ok(ledger)
    }

    pub fn status(&self, task_id: &str) -> Option<TrajectoryStatus> {
        self.latest.get(task_id).copied()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.latest.contains_key(task_id)
    }

    /// Number of distinct task ids on record.
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

/// Every trajectory in a ledger file, in write order; malformed lines are skipped.
pub async fn read_trajectories(path: &Path) -> Result<Vec<Trajectory>, LedgerError> {
    let content = fs::read(path)
        .await
        .map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let mut trajectories = Vec::new();
    for (_, line) in lines(&content) {
        match serde_json::from_slice::<Trajectory>(line) {
            Ok(trajectory) => trajectories.push(trajectory),
            Err(err) => warn!(path = %path.display(), error = %err, "Skipping malformed trajectory"),
        }
    }
    Ok(trajectories)
}

/// Non-blank lines with their zero-based index.
///
/// Split on raw bytes so a record cut inside a multi-byte character only
/// spoils its own line.
fn lines(content: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    content
        .split(|byte| *byte == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
}

struct WriteRequest {
    line: String,
    ack: oneshot::Sender<Result<(), LedgerError>>,
}

/// Cloneable handle to the single task that appends to the ledger file.
#[derive(Clone)]
pub struct LedgerWriter {
    sender: mpsc::Sender<WriteRequest>,
}

/// The writer task; [`finish`](LedgerTask::finish) waits for queued records to land.
pub struct LedgerTask {
    handle: JoinHandle<()>,
}

impl LedgerWriter {
    pub async fn open(path: &Path) -> Result<(Self, LedgerTask), LedgerError> {
        let io_error = |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .await
            .map_err(io_error)?;

        // A previous run may have died mid-line; start on a fresh one.
        if !ends_with_newline(&mut file).await.map_err(io_error)? {
            file.write_all(b"\n").await.map_err(io_error)?;
            file.flush().await.map_err(io_error)?;
        }

        let (sender, receiver) = mpsc::channel(64);
        let handle = tokio::spawn(write_loop(path.to_path_buf(), file, receiver));
        Ok((Self { sender }, LedgerTask { handle }))
    }

    /// Append one trajectory and wait until it is flushed.
    pub async fn append(&self, trajectory: &Trajectory) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(trajectory)?;
        line.push('\n');

        let (ack, done) = oneshot::channel();
        self.sender
            .send(WriteRequest { line, ack })
            .await
            .map_err(|_| LedgerError::WriterClosed)?;
        done.await.map_err(|_| LedgerError::WriterClosed)?
    }
}

impl LedgerTask {
    /// Wait for the writer to drain; every [`LedgerWriter`] clone must be dropped first.
    pub async fn finish(self) {
        if let Err(err) = self.handle.await {
            warn!(%err, "Run ledger writer task ended abnormally");
        }
    }
}

async fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

async fn write_loop(path: PathBuf, mut file: File, mut receiver: mpsc::Receiver<WriteRequest>) {
    while let Some(request) = receiver.recv().await {
        let written = async {
            file.write_all(request.line.as_bytes()).await?;
            file.flush().await
        }
        .await
        .map_err(|source| LedgerError::Io {
            path: path.clone(),
            source,
        });
        if written.is_ok() {
            debug!(path = %path.display(), bytes = request.line.len(), "Appended trajectory to run ledger");
        }
        let _ = request.ack.send(written);
    }
}
