//! Download task and lifecycle state definitions.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::extract::DownloadLink;

/// Identifier of a task, unique within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Allocates a fresh identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for a worker slot.
    Queued,
    /// Holding a worker slot and transferring.
    InProgress,
    /// Suspended at a chunk boundary; holds no worker slot.
    Paused,
    /// File complete and verified.
    Completed,
    /// Failed permanently or out of attempts.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl TaskState {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is an allowed transition.
    ///
    /// `Queued -> InProgress -> {Completed | Failed}`, `InProgress <-> Paused`,
    /// `Queued -> Paused` (admission held while paused), and any non-terminal
    /// state to `Cancelled`. A queued task may also fail before admission
    /// (duplicate destination).
    #[must_use]
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::{Cancelled, Completed, Failed, InProgress, Paused, Queued};
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Cancelled)
            | (Queued | Paused, InProgress)
            | (Queued | InProgress, Paused)
            | (InProgress, Completed)
            | (Queued | InProgress, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid task state: {s}")),
        }
    }
}

/// One file to transfer.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Unique identifier.
    pub id: TaskId,
    /// Link the file is fetched from.
    pub link: DownloadLink,
    /// Destination file path.
    pub destination: PathBuf,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Remote total from a previous run, when the journal knows it.
    pub expected_total: Option<u64>,
}

impl DownloadTask {
    /// Creates a queued task.
    #[must_use]
    pub fn new(id: TaskId, link: DownloadLink, destination: impl Into<PathBuf>) -> Self {
        Self {
            id,
            link,
            destination: destination.into(),
            state: TaskState::Queued,
            expected_total: None,
        }
    }

    /// Attaches a known remote total.
    #[must_use]
    pub fn with_expected_total(mut self, total: Option<u64>) -> Self {
        self.expected_total = total;
        self
    }

    /// Destination file name for display.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
