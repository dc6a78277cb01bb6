//! Bounded concurrent execution of download tasks.
//!
//! The [`DownloadScheduler`] owns every task handed to [`DownloadScheduler::run`]
//! until it reaches a terminal state. At most `max_workers` tasks are
//! InProgress at once: a task holds a semaphore permit for its whole active
//! period, retry backoff included, and gives it back when it pauses.
//!
//! Control (`pause_all`, `resume_all`, `cancel_all`) goes through a
//! [`tokio::sync::watch`] channel that transfers check at chunk boundaries and
//! queued tasks check before admission. The task table is a plain mutex that
//! is never held across an await.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use page_downloader::config::SessionConfig;
//! use page_downloader::scheduler::DownloadScheduler;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Arc::new(DownloadScheduler::from_config(Arc::new(SessionConfig::default()))?);
//! let summary = scheduler.run(Vec::new()).await;
//! assert!(summary.is_success());
//! # Ok(())
//! # }
//! ```

mod summary;
mod task;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

pub use summary::{CancelledTask, CompletedTask, DownloadSummary, FailedTask};
pub use task::{DownloadTask, TaskId, TaskState};

use crate::config::{ConfigError, MAX_WORKERS, SessionConfig};
use crate::download::{
    HttpClient, JournalStore, RetryDecision, RetryPolicy, TransferOutcome, TransferWorker,
    classify_error,
};
use crate::events::{EventKind, TaskEvent, TransferProgress};

/// Run-wide control signal observed by every task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    /// Tasks are admitted and transfer normally.
    Running,
    /// Active transfers stop at the next chunk boundary; nothing is admitted.
    Paused,
    /// Every non-terminal task ends as cancelled.
    Cancelled,
}

/// Terminal report of one task.
enum Finished {
    Completed(CompletedTask),
    Failed(FailedTask),
    Cancelled(CancelledTask),
}

/// Runs download tasks on a bounded pool with pause, resume and cancel.
pub struct DownloadScheduler {
    config: Arc<SessionConfig>,
    worker: TransferWorker,
    retry: RetryPolicy,
    permits: Semaphore,
    tasks: Mutex<HashMap<TaskId, DownloadTask>>,
    signal: watch::Sender<RunSignal>,
    events: Option<mpsc::UnboundedSender<TaskEvent>>,
    journal: JournalStore,
}

impl std::fmt::Debug for DownloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadScheduler")
            .field("max_workers", &self.config.max_workers)
            .field("signal", &*self.signal.borrow())
            .field("active_tasks", &self.lock_tasks().len())
            .finish_non_exhaustive()
    }
}

impl DownloadScheduler {
    /// Creates a scheduler around an existing worker.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWorkerCount`] unless `1 <= max_workers <= 64`.
    pub fn new(config: Arc<SessionConfig>, worker: TransferWorker) -> Result<Self, ConfigError> {
        if config.max_workers == 0 || config.max_workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                value: config.max_workers,
            });
        }
        let (signal, _) = watch::channel(RunSignal::Running);
        Ok(Self {
            retry: config.retry_policy(),
            permits: Semaphore::new(config.max_workers),
            journal: JournalStore::new(config.journal),
            tasks: Mutex::new(HashMap::new()),
            events: None,
            signal,
            worker,
            config,
        })
    }

    /// Creates a scheduler with its own HTTP client and no verification hook.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for invalid headers, worker count, or TLS setup.
    pub fn from_config(config: Arc<SessionConfig>) -> Result<Self, ConfigError> {
        let client = HttpClient::from_config(&config)?;
        let worker = TransferWorker::new(client, Arc::clone(&config));
        Self::new(config, worker)
    }

    /// Registers the channel receiving [`TaskEvent`]s.
    #[must_use]
    pub fn with_event_sender(mut self, sender: mpsc::UnboundedSender<TaskEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Replaces the retry policy derived from the configuration.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs `tasks` to a terminal state and returns the summary.
    ///
    /// A cancel left over from a previous run is cleared first; a pause is
    /// kept, so tasks queue until [`resume_all`](Self::resume_all). A task whose
    /// destination is already claimed by another active task fails immediately.
    #[instrument(skip_all, fields(task_count = tasks.len()))]
    pub async fn run(self: &Arc<Self>, tasks: Vec<DownloadTask>) -> DownloadSummary {
        self.signal.send_if_modified(|signal| {
            if *signal == RunSignal::Cancelled {
                *signal = RunSignal::Running;
                true
            } else {
                false
            }
        });

        let mut summary = DownloadSummary::default();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        {
            let mut table = self.lock_tasks();
            let mut destinations: HashSet<PathBuf> =
                table.values().map(|task| task.destination.clone()).collect();
            for mut task in tasks {
                if table.contains_key(&task.id) || !destinations.insert(task.destination.clone()) {
                    rejected.push(task);
                    continue;
                }
                task.state = TaskState::Queued;
                table.insert(task.id, task.clone());
                accepted.push(task);
            }
        }

        for task in rejected {
            let reason = format!("duplicate destination {}", task.destination.display());
            warn!(task_id = %task.id, reason = %reason, "task rejected");
            self.emit(task.id, EventKind::Failed {
                reason: reason.clone(),
            });
            summary.failed.push(FailedTask {
                id: task.id,
                url: task.link.url.to_string(),
                destination: task.destination,
                reason,
            });
        }

        info!(accepted = accepted.len(), max_workers = self.config.max_workers, "run started");

        let accepted_ids: Vec<TaskId> = accepted.iter().map(|task| task.id).collect();
        let mut drivers = JoinSet::new();
        for task in accepted {
            let this = Arc::clone(self);
            drivers.spawn(async move { this.drive(task).await });
        }

        while let Some(joined) = drivers.join_next().await {
            match joined {
                Ok(Finished::Completed(done)) => summary.completed.push(done),
                Ok(Finished::Failed(failed)) => summary.failed.push(failed),
                Ok(Finished::Cancelled(cancelled)) => summary.cancelled.push(cancelled),
                Err(join_error) => error!(error = %join_error, "task driver aborted"),
            }
        }

        // Tasks still in the table lost their driver.
        let orphans: Vec<DownloadTask> = {
            let mut table = self.lock_tasks();
            accepted_ids.iter().filter_map(|id| table.remove(id)).collect()
        };
        for task in orphans {
            summary.failed.push(FailedTask {
                id: task.id,
                url: task.link.url.to_string(),
                destination: task.destination,
                reason: "task driver aborted".to_string(),
            });
        }

        summary.sort();
        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            cancelled = summary.cancelled.len(),
            bytes_transferred = summary.bytes_transferred(),
            "run finished"
        );
        summary
    }

    /// Suspends active transfers at their next chunk boundary and holds admission.
    pub fn pause_all(&self) {
        let changed = self.signal.send_if_modified(|signal| {
            if *signal == RunSignal::Running {
                *signal = RunSignal::Paused;
                true
            } else {
                false
            }
        });
        if changed {
            info!("pausing all tasks");
        }
    }

    /// Re-admits paused and queued tasks up to the worker bound.
    pub fn resume_all(&self) {
        let changed = self.signal.send_if_modified(|signal| {
            if *signal == RunSignal::Paused {
                *signal = RunSignal::Running;
                true
            } else {
                false
            }
        });
        if changed {
            info!("resuming all tasks");
        }
    }

    /// Cancels every non-terminal task.
    pub fn cancel_all(&self) {
        let previous = self.signal.send_replace(RunSignal::Cancelled);
        if previous != RunSignal::Cancelled {
            info!("cancelling all tasks");
        }
    }

    /// Current control signal.
    #[must_use]
    pub fn signal(&self) -> RunSignal {
        *self.signal.borrow()
    }

    /// Snapshot of the non-terminal tasks, ordered by id.
    #[must_use]
    pub fn status(&self) -> Vec<DownloadTask> {
        let mut tasks: Vec<DownloadTask> = self.lock_tasks().values().cloned().collect();
        tasks.sort_by_key(|task| task.id);
        tasks
    }

    /// Lifecycle of one task, from admission to its terminal report.
    async fn drive(&self, task: DownloadTask) -> Finished {
        let mut signal = self.signal.subscribe();
        let mut failures: u32 = 0;
        let mut started = false;
        let id = task.id;

        loop {
            let Some(permit) = self.admit(&mut signal).await else {
                return self.finish_cancelled(&task).await;
            };

            // Only a journal-confirmed total may short-circuit a transfer.
            let offset = file_len(&task).await;
            self.set_state(task.id, TaskState::InProgress);
            if started {
                self.emit(task.id, EventKind::Resumed { offset });
            } else {
                started = true;
                self.emit(task.id, EventKind::Started {
                    file_name: task.file_name(),
                });
            }

            let outcome = loop {
                let progress = move |sample: TransferProgress| self.on_progress(id, sample);
                match self.worker.transfer(&task, &mut signal, &progress).await {
                    TransferOutcome::Failed(error) => {
                        failures += 1;
                        match self.retry.should_retry(classify_error(&error), failures) {
                            RetryDecision::Retry { delay, attempt } => {
                                warn!(task_id = %task.id, attempt, delay_ms = delay.as_millis(), error = %error, "transfer failed, retrying");
                                self.record_journal(&task, false).await;
                                match backoff(delay, &mut signal).await {
                                    Backoff::Elapsed => {
                                        debug!(task_id = %task.id, attempt, "retrying transfer");
                                    }
                                    Backoff::Paused => {
                                        break TransferOutcome::Paused {
                                            bytes: file_len(&task).await,
                                        };
                                    }
                                    Backoff::Cancelled => {
                                        break TransferOutcome::Cancelled {
                                            bytes: file_len(&task).await,
                                        };
                                    }
                                }
                            }
                            RetryDecision::DoNotRetry { reason } => {
                                debug!(task_id = %task.id, reason = %reason, "not retrying");
                                break TransferOutcome::Failed(error);
                            }
                        }
                    }
                    other => break other,
                }
            };

            // Keep the slot until the state is updated.
            match outcome {
                TransferOutcome::Paused { bytes } => {
                    self.record_journal(&task, false).await;
                    self.set_state(task.id, TaskState::Paused);
                    drop(permit);
                    self.emit(task.id, EventKind::Paused {
                        bytes_written: bytes,
                    });
                }
                TransferOutcome::Completed { bytes, transferred } => {
                    self.record_journal(&task, true).await;
                    self.set_state(task.id, TaskState::Completed);
                    self.emit(task.id, EventKind::Completed { bytes });
                    self.remove(task.id);
                    return Finished::Completed(CompletedTask {
                        id: task.id,
                        url: task.link.url.to_string(),
                        destination: task.destination,
                        bytes,
                        transferred,
                    });
                }
                TransferOutcome::Cancelled { .. } => {
                    if self.config.delete_partial_on_cancel {
                        self.discard_partial(&task).await;
                    }
                    self.record_journal(&task, false).await;
                    return self.report_cancelled(task);
                }
                TransferOutcome::Failed(error) => {
                    self.record_journal(&task, false).await;
                    let reason = error.to_string();
                    warn!(task_id = %task.id, reason = %reason, "task failed");
                    self.set_state(task.id, TaskState::Failed);
                    self.emit(task.id, EventKind::Failed {
                        reason: reason.clone(),
                    });
                    self.remove(task.id);
                    return Finished::Failed(FailedTask {
                        id: task.id,
                        url: task.link.url.to_string(),
                        destination: task.destination,
                        reason,
                    });
                }
            }
        }
    }

    /// Waits for a permit while the run is not paused; `None` once cancelled.
    async fn admit(&self, signal: &mut watch::Receiver<RunSignal>) -> Option<SemaphorePermit<'_>> {
        loop {
            let current = *signal.borrow_and_update();
            match current {
                RunSignal::Cancelled => return None,
                RunSignal::Paused => {
                    signal.changed().await.ok()?;
                    continue;
                }
                RunSignal::Running => {}
            }

            tokio::select! {
                permit = self.permits.acquire() => {
                    let permit = permit.ok()?;
                    match *signal.borrow() {
                        RunSignal::Running => return Some(permit),
                        RunSignal::Cancelled => return None,
                        RunSignal::Paused => drop(permit),
                    }
                }
                changed = signal.changed() => changed.ok()?,
            }
        }
    }

    /// Cancellation of a task that is not transferring (queued or paused).
    async fn finish_cancelled(&self, task: &DownloadTask) -> Finished {
        let was_paused = self.state_of(task.id) == Some(TaskState::Paused);
        if was_paused {
            if self.config.delete_partial_on_cancel {
                self.discard_partial(task).await;
            }
            self.record_journal(task, false).await;
        }
        self.report_cancelled(task.clone())
    }

    async fn discard_partial(&self, task: &DownloadTask) {
        match tokio::fs::remove_file(&task.destination).await {
            Ok(()) => debug!(task_id = %task.id, "partial file deleted"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => warn!(task_id = %task.id, error = %error, "cannot delete partial file"),
        }
    }

    fn report_cancelled(&self, task: DownloadTask) -> Finished {
        info!(task_id = %task.id, "task cancelled");
        self.set_state(task.id, TaskState::Cancelled);
        self.emit(task.id, EventKind::Cancelled);
        self.remove(task.id);
        Finished::Cancelled(CancelledTask {
            id: task.id,
            url: task.link.url.to_string(),
            destination: task.destination,
        })
    }

    fn on_progress(&self, id: TaskId, sample: TransferProgress) {
        if let Some(total) = sample.total
            && let Some(task) = self.lock_tasks().get_mut(&id)
        {
            task.expected_total = Some(total);
        }
        self.emit(id, EventKind::Progress {
            bytes_written: sample.bytes_written,
            total: sample.total,
        });
    }

    async fn record_journal(&self, task: &DownloadTask, completed: bool) {
        let total = self.known_total(task.id).or(task.expected_total);
        let bytes = file_len(task).await;
        self.journal
            .record(&task.destination, task.link.url.as_str(), total, bytes, completed)
            .await;
    }

    fn set_state(&self, id: TaskId, next: TaskState) {
        let mut table = self.lock_tasks();
        let Some(task) = table.get_mut(&id) else {
            return;
        };
        if task.state == next {
            return;
        }
        if task.state.can_transition_to(next) {
            debug!(task_id = %id, from = %task.state, to = %next, "task state changed");
            task.state = next;
        } else {
            warn!(task_id = %id, from = %task.state, to = %next, "ignoring invalid state transition");
        }
    }

    fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.lock_tasks().get(&id).map(|task| task.state)
    }

    fn known_total(&self, id: TaskId) -> Option<u64> {
        self.lock_tasks().get(&id).and_then(|task| task.expected_total)
    }

    fn remove(&self, id: TaskId) {
        self.lock_tasks().remove(&id);
    }

    fn emit(&self, task_id: TaskId, kind: EventKind) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = events.send(TaskEvent::new(task_id, kind));
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<TaskId, DownloadTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How a retry backoff ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backoff {
    Elapsed,
    Paused,
    Cancelled,
}

/// Sleeps for `delay` unless the run is paused or cancelled first.
async fn backoff(delay: Duration, signal: &mut watch::Receiver<RunSignal>) -> Backoff {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        let current = *signal.borrow_and_update();
        match current {
            RunSignal::Running => {}
            RunSignal::Paused => return Backoff::Paused,
            RunSignal::Cancelled => return Backoff::Cancelled,
        }
        tokio::select! {
            () = &mut sleep => return Backoff::Elapsed,
            changed = signal.changed() => {
                if changed.is_err() {
                    return Backoff::Cancelled;
                }
            }
        }
    }
}

async fn file_len(task: &DownloadTask) -> u64 {
    tokio::fs::metadata(&task.destination)
        .await
        .map_or(0, |metadata| metadata.len())
}
