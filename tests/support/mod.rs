//! Shared helpers for integration tests: localhost socket guard, a raw
//! server that drops connections mid-body, and task builders.

#![allow(dead_code)]

pub mod socket_guard;

use std::path::Path;
use std::sync::Arc;

use page_downloader::{
    DownloadLink, DownloadScheduler, DownloadTask, HttpClient, SessionConfig, TaskId,
    TransferWorker,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// Deterministic body of `len` bytes.
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Test session rooted at `root` with short timeouts and fast retries.
pub fn test_config(root: &Path) -> SessionConfig {
    SessionConfig::default()
        .with_destination_root(root)
        .with_request_timeout(std::time::Duration::from_secs(5))
        .with_max_attempts(1)
}

pub fn worker(config: &Arc<SessionConfig>) -> TransferWorker {
    let client = HttpClient::from_config(config).expect("client should build");
    TransferWorker::new(client, Arc::clone(config))
}

pub fn scheduler(config: SessionConfig) -> Arc<DownloadScheduler> {
    Arc::new(DownloadScheduler::from_config(Arc::new(config)).expect("scheduler should build"))
}

pub fn task(url: &str, destination: &Path) -> DownloadTask {
    let url = Url::parse(url).expect("valid test URL");
    DownloadTask::new(TaskId::next(), DownloadLink::new(url), destination)
}

/// Serves one connection that announces `announced` bytes, sends `sent`
/// bytes of [`body`], then closes. Returns the URL to request.
pub async fn spawn_truncating_server(announced: usize, sent: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind localhost");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {announced}\r\nContent-Type: application/octet-stream\r\n\r\n"
        );
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&body(announced)[..sent]).await;
        let _ = socket.flush().await;
        let _ = socket.shutdown().await;
    });
    format!("http://{addr}/file.bin")
}
