//! Aggregated outcome of a scheduler run.

use std::path::PathBuf;

use serde::Serialize;

use super::TaskId;

/// A task that finished with its file in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedTask {
    /// Task identifier.
    pub id: TaskId,
    /// Source URL.
    pub url: String,
    /// Destination path.
    pub destination: PathBuf,
    /// Final file size.
    pub bytes: u64,
    /// Bytes transferred in this run (zero when the file was already complete).
    pub transferred: u64,
}

/// A task that failed, with the reason reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTask {
    /// Task identifier.
    pub id: TaskId,
    /// Source URL.
    pub url: String,
    /// Destination path.
    pub destination: PathBuf,
    /// Human-readable failure reason.
    pub reason: String,
}

/// A task that was cancelled before finishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelledTask {
    /// Task identifier.
    pub id: TaskId,
    /// Source URL.
    pub url: String,
    /// Destination path.
    pub destination: PathBuf,
}

/// Final report of [`DownloadScheduler::run`](super::DownloadScheduler::run).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    /// Tasks whose files are complete.
    pub completed: Vec<CompletedTask>,
    /// Tasks that failed.
    pub failed: Vec<FailedTask>,
    /// Tasks that were cancelled.
    pub cancelled: Vec<CancelledTask>,
}

impl DownloadSummary {
    /// Total number of tasks reported.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.cancelled.len()
    }

    /// Whether every task completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    /// Bytes transferred over the network in this run.
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.completed.iter().map(|task| task.transferred).sum()
    }

    /// Sorts every list by task id so reports are stable.
    pub(crate) fn sort(&mut self) {
        self.completed.sort_by_key(|task| task.id);
        self.failed.sort_by_key(|task| task.id);
        self.cancelled.sort_by_key(|task| task.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = DownloadSummary::default();
        assert!(summary.is_success());
        summary.completed.push(CompletedTask {
            id: TaskId::new(2),
            url: "https://x/a.zip".into(),
            destination: PathBuf::from("a.zip"),
            bytes: 10,
            transferred: 4,
        });
        summary.failed.push(FailedTask {
            id: TaskId::new(1),
            url: "https://x/b.zip".into(),
            destination: PathBuf::from("b.zip"),
            reason: "HTTP 404".into(),
        });
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.bytes_transferred(), 4);
        assert!(!summary.is_success());
    }
}
