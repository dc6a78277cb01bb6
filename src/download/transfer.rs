//! Resumable single-file transfer.
//!
//! A [`TransferWorker`] moves one URL to one destination path. An existing
//! partial file is continued with `Range: bytes=<len>-`; servers that ignore
//! the range (200) or reject it (416) are handled by restarting from zero or,
//! when the 416 reports the exact on-disk length, by treating the file as
//! complete. Bytes go through a fixed-capacity [`BufWriter`] that is flushed
//! at every exit, so the on-disk length is always a valid resume offset.

use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, HeaderMap};
use reqwest::{Response, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::HttpClient;
use super::constants::WRITE_CHUNK_SIZE;
use super::error::DownloadError;
use super::verify::TransferVerifier;
use crate::config::SessionConfig;
use crate::events::TransferProgress;
use crate::scheduler::{DownloadTask, RunSignal};

/// How a transfer attempt ended.
#[derive(Debug)]
pub enum TransferOutcome {
    /// The file is complete (size-checked and verified).
    Completed {
        /// Final file size.
        bytes: u64,
        /// Bytes transferred by this attempt.
        transferred: u64,
    },
    /// The attempt failed; the partial file is left in place.
    Failed(DownloadError),
    /// The run was cancelled.
    Cancelled {
        /// Bytes left on disk (zero when the partial file was deleted).
        bytes: u64,
    },
    /// The run was paused; `bytes` is the next resume offset.
    Paused {
        /// Bytes flushed to disk.
        bytes: u64,
    },
}

/// Callback receiving a progress sample after every written chunk.
pub type ProgressFn<'a> = &'a (dyn Fn(TransferProgress) + Send + Sync);

/// Performs resumable transfers with the session's client and settings.
#[derive(Clone)]
pub struct TransferWorker {
    client: HttpClient,
    config: Arc<SessionConfig>,
    verifier: Option<Arc<dyn TransferVerifier>>,
}

impl std::fmt::Debug for TransferWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferWorker")
            .field("client", &self.client)
            .field("has_verifier", &self.verifier.is_some())
            .finish_non_exhaustive()
    }
}

enum Opened {
    AlreadyComplete,
    Stream {
        response: Response,
        offset: u64,
        total: Option<u64>,
    },
}

impl TransferWorker {
    /// Creates a worker without a verification hook.
    #[must_use]
    pub fn new(client: HttpClient, config: Arc<SessionConfig>) -> Self {
        Self {
            client,
            config,
            verifier: None,
        }
    }

    /// Installs a verification hook run after every completed transfer.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn TransferVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Transfers `task.link` to `task.destination`, resuming when possible.
    ///
    /// `signal` is checked after every written chunk (and while waiting for
    /// the next one); `progress` receives the on-disk length after each chunk.
    #[instrument(skip_all, fields(task_id = %task.id, url = %task.link.url))]
    pub async fn transfer(
        &self,
        task: &DownloadTask,
        signal: &mut watch::Receiver<RunSignal>,
        progress: ProgressFn<'_>,
    ) -> TransferOutcome {
        match self.run(task, signal, progress).await {
            Ok(outcome) => outcome,
            Err(error) => {
                debug!(error = %error, "transfer attempt failed");
                TransferOutcome::Failed(error)
            }
        }
    }

    async fn run(
        &self,
        task: &DownloadTask,
        signal: &mut watch::Receiver<RunSignal>,
        progress: ProgressFn<'_>,
    ) -> Result<TransferOutcome, DownloadError> {
        let path = task.destination.as_path();
        let url = &task.link.url;
        let mut existing = file_len(path).await?;

        let current = *signal.borrow_and_update();
        match current {
            RunSignal::Running => {}
            RunSignal::Paused => return Ok(TransferOutcome::Paused { bytes: existing }),
            RunSignal::Cancelled => return Ok(self.cancelled(path, existing).await),
        }

        if let Some(total) = task.expected_total {
            if existing > 0 && existing == total {
                debug!(bytes = existing, "file already complete, skipping request");
                return self.finish(task, Some(total), 0).await;
            }
            if existing > total {
                warn!(existing, total, "partial file exceeds remote total, discarding");
                truncate(path).await?;
                existing = 0;
            }
        }

        let opened = tokio::select! {
            opened = self.open(url, existing) => opened?,
            halt = halted(signal) => {
                return Ok(match halt {
                    RunSignal::Paused => TransferOutcome::Paused { bytes: existing },
                    _ => self.cancelled(path, existing).await,
                });
            }
        };
        let (response, offset, total) = match opened {
            Opened::AlreadyComplete => return self.finish(task, Some(existing), 0).await,
            Opened::Stream {
                response,
                offset,
                total,
            } => (response, offset, total),
        };
        debug!(offset, total = ?total, status = response.status().as_u16(), "streaming body");

        let file = open_destination(path, offset).await?;
        let mut writer = BufWriter::with_capacity(WRITE_CHUNK_SIZE, file);
        let mut written = offset;
        let mut transferred = 0u64;
        progress(TransferProgress::now(written, total));

        let mut stream = response.bytes_stream();
        let mut watching = true;
        loop {
            let current = *signal.borrow_and_update();
            match current {
                RunSignal::Running => {}
                RunSignal::Paused => {
                    flush(&mut writer, path).await?;
                    info!(bytes = written, "transfer paused");
                    return Ok(TransferOutcome::Paused { bytes: written });
                }
                RunSignal::Cancelled => {
                    flush(&mut writer, path).await?;
                    drop(writer);
                    return Ok(self.cancelled(path, written).await);
                }
            }

            let next = tokio::select! {
                changed = signal.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                    }
                    continue;
                }
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    flush(&mut writer, path).await?;
                    warn!(bytes = written, error = %error, "stream interrupted");
                    return Err(DownloadError::network(url.as_str(), error));
                }
            };

            let allowed = total.map_or(chunk.len(), |total| {
                usize::try_from(total.saturating_sub(written))
                    .unwrap_or(usize::MAX)
                    .min(chunk.len())
            });
            writer
                .write_all(&chunk[..allowed])
                .await
                .map_err(|e| DownloadError::io(path, e))?;
            written += len_u64(allowed);
            transferred += len_u64(allowed);

            if allowed < chunk.len() {
                flush(&mut writer, path).await?;
                return Err(DownloadError::size_mismatch(
                    path,
                    written,
                    written + len_u64(chunk.len() - allowed),
                ));
            }
            progress(TransferProgress::now(written, total));
        }

        flush(&mut writer, path).await?;
        drop(writer);
        self.finish(task, total, transferred).await
    }

    /// Sends the (possibly ranged) request and decides where writing starts.
    async fn open(&self, url: &Url, existing: u64) -> Result<Opened, DownloadError> {
        if existing == 0 {
            let response = self.client.get(url, None).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
            }
            let total = body_total(&response, 0);
            return Ok(Opened::Stream {
                response,
                offset: 0,
                total,
            });
        }

        let response = self.client.get(url, Some(existing)).await?;
        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let range = ContentRange::from_headers(response.headers());
                if range
                    .and_then(|range| range.start)
                    .is_some_and(|start| start != existing)
                {
                    warn!(offset = existing, "server answered a different range, restarting from zero");
                    drop(response);
                    return self.restart(url, existing).await;
                }
                let total = body_total(&response, existing);
                Ok(Opened::Stream {
                    response,
                    offset: existing,
                    total,
                })
            }
            StatusCode::OK => {
                warn!(offset = existing, "server ignored range request, restarting from zero");
                let total = response.content_length();
                Ok(Opened::Stream {
                    response,
                    offset: 0,
                    total,
                })
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                let complete = ContentRange::from_headers(response.headers())
                    .and_then(|range| range.complete_length);
                if complete == Some(existing) {
                    debug!(bytes = existing, "server reports file already complete");
                    return Ok(Opened::AlreadyComplete);
                }
                warn!(offset = existing, remote_total = ?complete, "range not satisfiable, restarting from zero");
                drop(response);
                self.restart(url, existing).await
            }
            status => Err(DownloadError::http_status(url.as_str(), status.as_u16())),
        }
    }

    /// Plain GET after a failed resume; only a 200 is acceptable.
    async fn restart(&self, url: &Url, offset: u64) -> Result<Opened, DownloadError> {
        let response = self.client.get(url, None).await?;
        let status = response.status();
        if status == StatusCode::OK {
            let total = response.content_length();
            return Ok(Opened::Stream {
                response,
                offset: 0,
                total,
            });
        }
        debug!(status = status.as_u16(), "restart from zero failed");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(DownloadError::http_status(url.as_str(), status.as_u16()))
        } else {
            Err(DownloadError::range_not_supported(url.as_str(), offset))
        }
    }

    /// Size check and verification of a fully written file.
    async fn finish(
        &self,
        task: &DownloadTask,
        total: Option<u64>,
        transferred: u64,
    ) -> Result<TransferOutcome, DownloadError> {
        let path = task.destination.as_path();
        let on_disk = file_len(path).await?;
        if let Some(expected) = total
            && on_disk != expected
        {
            return Err(DownloadError::size_mismatch(path, expected, on_disk));
        }

        if let Some(verifier) = &self.verifier {
            verifier.verify(&task.link, path).await?;
        }

        info!(path = %path.display(), bytes = on_disk, transferred, "transfer complete");
        Ok(TransferOutcome::Completed {
            bytes: on_disk,
            transferred,
        })
    }

    async fn cancelled(&self, path: &Path, bytes: u64) -> TransferOutcome {
        if !self.config.delete_partial_on_cancel {
            info!(bytes, "transfer cancelled, partial file kept");
            return TransferOutcome::Cancelled { bytes };
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!(path = %path.display(), "transfer cancelled, partial file deleted");
                TransferOutcome::Cancelled { bytes: 0 }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                TransferOutcome::Cancelled { bytes: 0 }
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "cannot delete partial file");
                TransferOutcome::Cancelled { bytes }
            }
        }
    }
}

/// Resolves with the first signal other than [`RunSignal::Running`].
async fn halted(signal: &mut watch::Receiver<RunSignal>) -> RunSignal {
    loop {
        if signal.changed().await.is_err() {
            return std::future::pending().await;
        }
        let current = *signal.borrow_and_update();
        if current != RunSignal::Running {
            return current;
        }
    }
}

/// Parsed `Content-Range` header (`bytes 0-99/200`, `bytes */200`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContentRange {
    start: Option<u64>,
    complete_length: Option<u64>,
}

impl ContentRange {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(Self::parse)
    }

    fn parse(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, complete) = spec.split_once('/')?;
        let start = match range.trim() {
            "*" => None,
            range => Some(range.split_once('-')?.0.trim().parse().ok()?),
        };
        let complete_length = match complete.trim() {
            "*" => None,
            length => Some(length.parse().ok()?),
        };
        Some(Self {
            start,
            complete_length,
        })
    }
}

/// Remote total implied by a response that starts writing at `offset`.
fn body_total(response: &Response, offset: u64) -> Option<u64> {
    if response.status() == StatusCode::PARTIAL_CONTENT
        && let Some(total) =
            ContentRange::from_headers(response.headers()).and_then(|r| r.complete_length)
    {
        return Some(total);
    }
    response.content_length().map(|len| offset + len)
}

async fn file_len(path: &Path) -> Result<u64, DownloadError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.len()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(error) => Err(DownloadError::io(path, error)),
    }
}

async fn truncate(path: &Path) -> Result<(), DownloadError> {
    File::create(path)
        .await
        .map(drop)
        .map_err(|e| DownloadError::io(path, e))
}

async fn open_destination(path: &Path, offset: u64) -> Result<File, DownloadError> {
    let file = if offset > 0 {
        OpenOptions::new().append(true).open(path).await
    } else {
        File::create(path).await
    };
    file.map_err(|e| DownloadError::io(path, e))
}

async fn flush(writer: &mut BufWriter<File>, path: &Path) -> Result<(), DownloadError> {
    writer.flush().await.map_err(|e| DownloadError::io(path, e))
}

fn len_u64(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}
