use serde::Serialize;
use std::fmt;

use crate::domain::TrajectoryStatus;

/// Outcome counts for one runner invocation.
///
/// `total` is the size of the task list; `skipped` tasks were already on the
/// ledger and `cancelled` ones were never finished because of an interrupt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub error: usize,
    pub max_turns_exceeded: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, status: TrajectoryStatus) {
        match status {
            TrajectoryStatus::Completed => self.completed += 1,
            TrajectoryStatus::MaxTurnsExceeded => self.max_turns_exceeded += 1,
            TrajectoryStatus::Error => self.error += 1,
        }
    }

    /// Trajectories written during this invocation.
    pub fn executed(&self) -> usize {
        self.completed + self.error + self.max_turns_exceeded
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} task(s): {} completed, {} hit the turn budget, {} errored, {} skipped",
            self.total, self.completed, self.max_turns_exceeded, self.error, self.skipped
        )?;
        if self.cancelled > 0 {
            write!(f, ", {} cancelled", self.cancelled)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_each_status_separately() {
        let mut summary = RunSummary::new(4);
        summary.record(TrajectoryStatus::Completed);
        summary.record(TrajectoryStatus::MaxTurnsExceeded);
        summary.record(TrajectoryStatus::Error);
        summary.skipped = 1;

        assert_eq!(summary.executed(), 3);
        assert_eq!(
            summary.to_string(),
            "4 task(s): 1 completed, 1 hit the turn budget, 1 errored, 1 skipped"
        );
    }
}
