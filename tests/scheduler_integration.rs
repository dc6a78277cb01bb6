//! Integration tests for the bounded scheduler and its run-wide controls.

mod support;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use page_downloader::{
    DownloadScheduler, DownloadSummary, DownloadTask, EventKind, TaskState,
};
use support::socket_guard::start_mock_server_or_skip;
use support::{body, scheduler, task, test_config};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const FILE_LEN: usize = 2048;

async fn mount_slow_files(server: &MockServer, delay: Duration) {
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body(FILE_LEN))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

fn tasks(server: &MockServer, dir: &TempDir, count: usize) -> Vec<DownloadTask> {
    (0..count)
        .map(|i| {
            let name = format!("part{i}.rar");
            task(&format!("{}/{name}", server.uri()), &dir.path().join(name))
        })
        .collect()
}

fn spawn_run(
    scheduler: &Arc<DownloadScheduler>,
    tasks: Vec<DownloadTask>,
) -> JoinHandle<DownloadSummary> {
    let scheduler = Arc::clone(scheduler);
    tokio::spawn(async move { scheduler.run(tasks).await })
}

/// Polls `status()` until `done` holds or `limit` elapses.
async fn wait_for_status<F>(scheduler: &DownloadScheduler, limit: Duration, done: F) -> bool
where
    F: Fn(&[DownloadTask]) -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if done(&scheduler.status()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn count_in(status: &[DownloadTask], state: TaskState) -> usize {
    status.iter().filter(|task| task.state == state).count()
}

fn completed_destinations(summary: &DownloadSummary) -> Vec<PathBuf> {
    summary
        .completed
        .iter()
        .map(|done| done.destination.clone())
        .collect()
}

#[tokio::test]
async fn test_in_progress_never_exceeds_worker_bound() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_slow_files(&server, Duration::from_millis(150)).await;
    let dir = TempDir::new().expect("temp dir");
    let scheduler = scheduler(test_config(dir.path()).with_max_workers(2).with_journal(false));

    let handle = spawn_run(&scheduler, tasks(&server, &dir, 6));

    let mut peak = 0;
    while !handle.is_finished() {
        let in_progress = count_in(&scheduler.status(), TaskState::InProgress);
        assert!(in_progress <= 2, "{in_progress} tasks in progress with 2 workers");
        peak = peak.max(in_progress);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let summary = handle.await.expect("run task");

    assert_eq!(peak, 2, "both worker slots should be used");
    assert_eq!(summary.completed.len(), 6);
    assert!(summary.is_success());
    for done in &summary.completed {
        assert_eq!(done.bytes, FILE_LEN as u64);
        assert_eq!(std::fs::read(&done.destination).expect("read file"), body(FILE_LEN));
    }
}

#[tokio::test]
async fn test_pause_holds_tasks_and_resume_completes_them() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_slow_files(&server, Duration::from_millis(300)).await;
    let dir = TempDir::new().expect("temp dir");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = Arc::new(
        DownloadScheduler::from_config(Arc::new(
            test_config(dir.path()).with_max_workers(2).with_journal(false),
        ))
        .expect("scheduler")
        .with_event_sender(tx),
    );

    let handle = spawn_run(&scheduler, tasks(&server, &dir, 3));
    assert!(
        wait_for_status(&scheduler, Duration::from_secs(2), |status| {
            count_in(status, TaskState::InProgress) == 2
        })
        .await,
        "two tasks should start"
    );

    scheduler.pause_all();
    assert!(
        wait_for_status(&scheduler, Duration::from_secs(2), |status| {
            count_in(status, TaskState::InProgress) == 0
        })
        .await,
        "active tasks should stop after pause"
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!handle.is_finished(), "paused run must not finish");
    let status = scheduler.status();
    assert_eq!(status.len(), 3, "no task reaches a terminal state while paused");
    assert_eq!(count_in(&status, TaskState::Paused), 2);
    assert_eq!(count_in(&status, TaskState::Queued), 1);

    scheduler.resume_all();
    let summary = handle.await.expect("run task");
    assert_eq!(summary.completed.len(), 3, "resume should finish every task");
    assert!(summary.is_success());

    drop(scheduler);
    let mut paused = 0;
    let mut resumed = 0;
    while let Some(event) = rx.recv().await {
        match event.kind {
            EventKind::Paused { .. } => paused += 1,
            EventKind::Resumed { .. } => resumed += 1,
            _ => {}
        }
    }
    assert_eq!(paused, 2);
    assert_eq!(resumed, 2);
}

#[tokio::test]
async fn test_paused_and_uninterrupted_runs_produce_same_files() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_slow_files(&server, Duration::from_millis(100)).await;

    let plain_dir = TempDir::new().expect("temp dir");
    let plain = scheduler(test_config(plain_dir.path()).with_journal(false))
        .run(tasks(&server, &plain_dir, 3))
        .await;

    let paused_dir = TempDir::new().expect("temp dir");
    let scheduler = scheduler(test_config(paused_dir.path()).with_journal(false));
    let handle = spawn_run(&scheduler, tasks(&server, &paused_dir, 3));
    tokio::time::sleep(Duration::from_millis(30)).await;
    scheduler.pause_all();
    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.resume_all();
    let paused = handle.await.expect("run task");

    assert_eq!(plain.completed.len(), paused.completed.len());
    let names = |paths: Vec<PathBuf>| -> Vec<String> {
        let mut names: Vec<String> = paths
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    };
    assert_eq!(
        names(completed_destinations(&plain)),
        names(completed_destinations(&paused))
    );
    for done in &paused.completed {
        assert_eq!(std::fs::read(&done.destination).expect("read file"), body(FILE_LEN));
    }
}

#[tokio::test]
async fn test_cancel_all_reports_every_unfinished_task() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_slow_files(&server, Duration::from_secs(10)).await;
    let dir = TempDir::new().expect("temp dir");
    let scheduler = scheduler(test_config(dir.path()).with_max_workers(1).with_journal(false));

    let handle = spawn_run(&scheduler, tasks(&server, &dir, 3));
    assert!(
        wait_for_status(&scheduler, Duration::from_secs(2), |status| {
            count_in(status, TaskState::InProgress) == 1
        })
        .await,
        "first task should start"
    );

    scheduler.cancel_all();
    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cancel should not wait for the slow response")
        .expect("run task");

    assert_eq!(summary.cancelled.len(), 3);
    assert!(summary.completed.is_empty());
    assert!(summary.failed.is_empty());
    assert!(!summary.is_success());
    assert!(scheduler.status().is_empty());
}

#[tokio::test]
async fn test_cancel_with_delete_removes_partial_files() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_slow_files(&server, Duration::from_secs(10)).await;
    let dir = TempDir::new().expect("temp dir");
    let scheduler = scheduler(
        test_config(dir.path())
            .with_max_workers(1)
            .with_journal(false)
            .with_delete_partial_on_cancel(true),
    );

    let seeded = tasks(&server, &dir, 2);
    for task in &seeded {
        std::fs::write(&task.destination, b"stale partial").expect("seed partial file");
    }
    let destinations: Vec<PathBuf> = seeded.iter().map(|task| task.destination.clone()).collect();

    let handle = spawn_run(&scheduler, seeded);
    assert!(
        wait_for_status(&scheduler, Duration::from_secs(2), |status| {
            count_in(status, TaskState::InProgress) == 1
        })
        .await
    );
    scheduler.cancel_all();
    let summary = handle.await.expect("run task");

    assert_eq!(summary.cancelled.len(), 2);
    assert!(
        destinations.iter().any(|path| !path.exists()),
        "the active task's partial file should be deleted"
    );
}
