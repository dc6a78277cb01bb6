//! Integration tests for resumable single-file transfers.
//!
//! Covers the range-resume contract (206 append, 200 restart, 416 already
//! complete), a connection dropped mid-body, size checks and verification.

mod support;

use std::sync::{Arc, Mutex};

use page_downloader::{
    DownloadError, RunSignal, Sha256Verifier, TransferOutcome, TransferProgress, SessionConfig,
};
use support::socket_guard::start_mock_server_or_skip;
use support::{body, spawn_truncating_server, task, test_config, worker};
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

const FULL: usize = 8192;
const HALF: usize = 4096;

fn running() -> (watch::Sender<RunSignal>, watch::Receiver<RunSignal>) {
    watch::channel(RunSignal::Running)
}

fn config(temp: &TempDir) -> Arc<SessionConfig> {
    Arc::new(test_config(temp.path()))
}

#[tokio::test]
async fn test_partial_file_resumes_with_range_request() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let expected = body(FULL);
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .and(header("range", "bytes=4096-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 4096-8191/8192")
                .set_body_bytes(expected[HALF..].to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let destination = temp.path().join("file.bin");
    std::fs::write(&destination, &expected[..HALF]).expect("seed partial file");

    let samples = Mutex::new(Vec::new());
    let record = |sample: TransferProgress| {
        samples.lock().expect("samples lock").push(sample.bytes_written);
    };
    let (_tx, mut rx) = running();
    let outcome = worker(&config(&temp))
        .transfer(
            &task(&format!("{}/file.bin", server.uri()), &destination),
            &mut rx,
            &record,
        )
        .await;

    assert!(
        matches!(outcome, TransferOutcome::Completed { bytes: 8192, transferred: 4096 }),
        "expected resumed completion, got {outcome:?}"
    );
    assert_eq!(std::fs::read(&destination).expect("read file"), expected);

    let samples = samples.into_inner().expect("samples lock");
    assert_eq!(samples.first(), Some(&4096), "progress starts at the resume offset");
    assert_eq!(samples.last(), Some(&8192));
    assert!(samples.windows(2).all(|pair| pair[0] <= pair[1]), "progress is monotonic");
}

#[tokio::test]
async fn test_server_ignoring_range_restarts_from_zero() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let expected = body(FULL);
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(expected.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let destination = temp.path().join("file.bin");
    std::fs::write(&destination, vec![0xFF; 100]).expect("seed stale partial file");

    let noop = |_: TransferProgress| {};
    let (_tx, mut rx) = running();
    let outcome = worker(&config(&temp))
        .transfer(
            &task(&format!("{}/file.bin", server.uri()), &destination),
            &mut rx,
            &noop,
        )
        .await;

    assert!(
        matches!(outcome, TransferOutcome::Completed { bytes: 8192, transferred: 8192 }),
        "expected full restart, got {outcome:?}"
    );
    assert_eq!(
        std::fs::read(&destination).expect("read file"),
        expected,
        "stale prefix must be overwritten, not appended to"
    );
}

#[tokio::test]
async fn test_range_not_satisfiable_with_matching_total_is_complete() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(header("range", "bytes=8192-"))
        .respond_with(ResponseTemplate::new(416).insert_header("content-range", "bytes */8192"))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let destination = temp.path().join("file.bin");
    std::fs::write(&destination, body(FULL)).expect("seed complete file");

    let noop = |_: TransferProgress| {};
    let (_tx, mut rx) = running();
    let outcome = worker(&config(&temp))
        .transfer(
            &task(&format!("{}/file.bin", server.uri()), &destination),
            &mut rx,
            &noop,
        )
        .await;

    assert!(
        matches!(outcome, TransferOutcome::Completed { bytes: 8192, transferred: 0 }),
        "expected completion without transfer, got {outcome:?}"
    );
    assert_eq!(std::fs::read(&destination).expect("read file"), body(FULL));
}

#[tokio::test]
async fn test_known_complete_file_is_not_requested() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let destination = temp.path().join("file.bin");
    std::fs::write(&destination, body(FULL)).expect("seed complete file");

    let noop = |_: TransferProgress| {};
    let (_tx, mut rx) = running();
    let known = task(&format!("{}/file.bin", server.uri()), &destination)
        .with_expected_total(Some(FULL as u64));
    let outcome = worker(&config(&temp)).transfer(&known, &mut rx, &noop).await;

    assert!(matches!(
        outcome,
        TransferOutcome::Completed {
            bytes: 8192,
            transferred: 0
        }
    ));
}

#[tokio::test]
async fn test_dropped_connection_keeps_prefix_for_resume() {
    if support::socket_guard::should_skip_socket_bound_test() {
        return;
    }
    let temp = TempDir::new().expect("temp dir");
    let destination = temp.path().join("file.bin");
    let config = config(&temp);
    let worker = worker(&config);
    let noop = |_: TransferProgress| {};

    let truncating = spawn_truncating_server(FULL, HALF).await;
    let (_tx, mut rx) = running();
    let first = worker
        .transfer(&task(&truncating, &destination), &mut rx, &noop)
        .await;
    assert!(
        matches!(first, TransferOutcome::Failed(DownloadError::Network { .. })),
        "truncated body should fail as a network error, got {first:?}"
    );
    assert_eq!(
        std::fs::metadata(&destination).expect("partial file").len(),
        HALF as u64,
        "bytes received before the drop stay on disk"
    );

    let server = start_mock_server_or_skip()
        .await
        .expect("socket availability already checked");
    let expected = body(FULL);
    Mock::given(method("GET"))
        .and(header("range", "bytes=4096-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 4096-8191/8192")
                .set_body_bytes(expected[HALF..].to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let second = worker
        .transfer(
            &task(&format!("{}/file.bin", server.uri()), &destination),
            &mut rx,
            &noop,
        )
        .await;
    assert!(
        matches!(second, TransferOutcome::Completed { bytes: 8192, transferred: 4096 }),
        "expected resume to finish the file, got {second:?}"
    );
    assert_eq!(std::fs::read(&destination).expect("read file"), expected);
}

#[tokio::test]
async fn test_short_body_fails_size_check() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let expected = body(FULL);
    Mock::given(method("GET"))
        .and(header("range", "bytes=4096-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 4096-8999/9000")
                .set_body_bytes(expected[HALF..].to_vec()),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let destination = temp.path().join("file.bin");
    std::fs::write(&destination, &expected[..HALF]).expect("seed partial file");

    let noop = |_: TransferProgress| {};
    let (_tx, mut rx) = running();
    let outcome = worker(&config(&temp))
        .transfer(
            &task(&format!("{}/file.bin", server.uri()), &destination),
            &mut rx,
            &noop,
        )
        .await;

    assert!(
        matches!(outcome, TransferOutcome::Failed(DownloadError::SizeMismatch { .. })),
        "expected size mismatch, got {outcome:?}"
    );
}

#[tokio::test]
async fn test_error_status_fails_without_creating_file() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let destination = temp.path().join("missing.bin");

    let noop = |_: TransferProgress| {};
    let (_tx, mut rx) = running();
    let outcome = worker(&config(&temp))
        .transfer(
            &task(&format!("{}/missing.bin", server.uri()), &destination),
            &mut rx,
            &noop,
        )
        .await;

    assert!(matches!(
        outcome,
        TransferOutcome::Failed(DownloadError::HttpStatus { status: 404, .. })
    ));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_paused_signal_returns_before_any_request() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let destination = temp.path().join("file.bin");
    std::fs::write(&destination, body(100)).expect("seed partial file");

    let noop = |_: TransferProgress| {};
    let (_tx, mut rx) = watch::channel(RunSignal::Paused);
    let outcome = worker(&config(&temp))
        .transfer(
            &task(&format!("{}/file.bin", server.uri()), &destination),
            &mut rx,
            &noop,
        )
        .await;

    assert!(matches!(outcome, TransferOutcome::Paused { bytes: 100 }));
}

#[tokio::test]
async fn test_verifier_rejects_wrong_digest() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body(64)))
        .mount(&server)
        .await;

    let temp = TempDir::new().expect("temp dir");
    let destination = temp.path().join("file.bin");
    let url = format!("{}/file.bin", server.uri());
    let verifier = Sha256Verifier::new().with_digest(url.clone(), "00".repeat(32));

    let noop = |_: TransferProgress| {};
    let (_tx, mut rx) = running();
    let outcome = worker(&config(&temp))
        .with_verifier(Arc::new(verifier))
        .transfer(&task(&url, &destination), &mut rx, &noop)
        .await;

    assert!(
        matches!(outcome, TransferOutcome::Failed(DownloadError::Verification { .. })),
        "expected verification failure, got {outcome:?}"
    );
}
