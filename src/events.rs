//! Lifecycle and progress events emitted by the scheduler.
//!
//! Events travel over an unbounded channel so a slow consumer never blocks a
//! transfer. They are informational: losing one never changes the outcome of a
//! run.

use std::time::SystemTime;

use serde::Serialize;

use crate::scheduler::TaskId;

/// A single event for one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    /// Task the event belongs to.
    pub task_id: TaskId,
    /// What happened.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl TaskEvent {
    pub(crate) fn new(task_id: TaskId, kind: EventKind) -> Self {
        Self { task_id, kind }
    }
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// First activation of the task.
    Started {
        /// Destination file name.
        file_name: String,
    },
    /// Bytes landed on disk.
    Progress {
        /// Bytes of the file currently on disk.
        bytes_written: u64,
        /// Remote total, when known.
        total: Option<u64>,
    },
    /// The task stopped at a chunk boundary and released its worker.
    Paused {
        /// Bytes on disk at the pause point.
        bytes_written: u64,
    },
    /// The task was re-activated after a pause or a retry backoff.
    Resumed {
        /// Offset the transfer resumes from.
        offset: u64,
    },
    /// The file is complete and verified.
    Completed {
        /// Final size in bytes.
        bytes: u64,
    },
    /// The task failed permanently.
    Failed {
        /// Human-readable reason.
        reason: String,
    },
    /// The task was cancelled.
    Cancelled,
}

/// A progress sample reported by a transfer after each written chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes of the file currently on disk (resume offset included).
    pub bytes_written: u64,
    /// Remote total, when known.
    pub total: Option<u64>,
    /// When the sample was taken.
    pub timestamp: SystemTime,
}

impl TransferProgress {
    /// Creates a sample stamped with the current time.
    #[must_use]
    pub fn now(bytes_written: u64, total: Option<u64>) -> Self {
        Self {
            bytes_written,
            total,
            timestamp: SystemTime::now(),
        }
    }
}
