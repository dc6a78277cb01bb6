//! End-to-end CLI tests for the page-downloader binary.

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use support::body;
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn binary() -> Command {
    Command::cargo_bin("page-downloader").expect("binary should be built")
}

/// Runs the binary off the async runtime so the mock server keeps serving.
async fn run_binary(args: Vec<String>) -> assert_cmd::assert::Assert {
    tokio::task::spawn_blocking(move || binary().args(args).assert())
        .await
        .expect("blocking command task")
}

async fn mount_game(server: &MockServer, archive_status: u16) {
    Mock::given(method("GET"))
        .and(path("/games/demo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<a href="/files/demo.zip">Download</a>"#),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/demo.zip"))
        .respond_with(ResponseTemplate::new(archive_status).set_body_bytes(body(1024)))
        .mount(server)
        .await;
}

#[test]
fn test_binary_help_displays_usage() {
    binary()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download every file linked from a game page"))
        .stdout(predicate::str::contains("--concurrency"));
}

#[test]
fn test_binary_version_displays_version() {
    binary()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("page-downloader"));
}

#[test]
fn test_binary_missing_url_returns_error() {
    binary()
        .assert()
        .failure()
        .stderr(predicate::str::contains("<URL>"));
}

#[test]
fn test_binary_invalid_concurrency_returns_error() {
    binary()
        .args(["-c", "0", "https://example.com/games/demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_non_http_url_fails_before_network() {
    let root = TempDir::new().expect("temp dir");
    binary()
        .args(["-q", "-o"])
        .arg(root.path())
        .arg("ftp://example.com/games/demo")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported scheme"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_downloads_page_files_as_json() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_game(&server, 200).await;
    let root = TempDir::new().expect("temp dir");

    run_binary(vec![
        "--json".to_string(),
        "-o".to_string(),
        root.path().display().to_string(),
        format!("{}/games/demo", server.uri()),
    ])
    .await
    .success()
    .stdout(predicate::str::contains("\"completed\""))
    .stdout(predicate::str::contains("demo.zip"));

    let file = root.path().join("demo").join("demo.zip");
    assert_eq!(std::fs::read(file).expect("downloaded file"), body(1024));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_failed_file_exits_incomplete() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_game(&server, 404).await;
    let root = TempDir::new().expect("temp dir");

    run_binary(vec![
        "-q".to_string(),
        "-o".to_string(),
        root.path().display().to_string(),
        format!("{}/games/demo", server.uri()),
    ])
    .await
    .code(2)
    .stdout(predicate::str::contains("Failed: 1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_page_without_links_fails() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>nothing here</p>"))
        .mount(&server)
        .await;
    let root = TempDir::new().expect("temp dir");

    run_binary(vec![
        "-q".to_string(),
        "-o".to_string(),
        root.path().display().to_string(),
        format!("{}/games/demo", server.uri()),
    ])
    .await
    .failure()
    .stderr(predicate::str::contains("no download links found"));
}
