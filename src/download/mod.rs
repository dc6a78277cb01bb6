//! Resumable HTTP file transfers.
//!
//! This module provides the pieces a scheduler needs to move one remote file
//! to disk reliably:
//!
//! - [`HttpClient`] - shared reqwest client with session headers and timeouts
//! - [`TransferWorker`] - range-resuming streaming transfer with pause/cancel
//! - [`RetryPolicy`] / [`classify_error`] - exponential backoff for transient failures
//! - [`TransferVerifier`] - optional post-transfer check ([`Sha256Verifier`])
//! - [`Journal`] - per-directory resume state
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use page_downloader::config::SessionConfig;
//! use page_downloader::download::{HttpClient, TransferOutcome, TransferWorker};
//! use page_downloader::events::TransferProgress;
//! use page_downloader::extract::DownloadLink;
//! use page_downloader::scheduler::{DownloadTask, RunSignal, TaskId};
//! use tokio::sync::watch;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(SessionConfig::default());
//! let worker = TransferWorker::new(HttpClient::from_config(&config)?, Arc::clone(&config));
//! let link = DownloadLink::new(url::Url::parse("https://example.com/game.zip")?);
//! let task = DownloadTask::new(TaskId::next(), link, "./game.zip");
//! let (_control, mut signal) = watch::channel(RunSignal::Running);
//!
//! match worker.transfer(&task, &mut signal, &|_: TransferProgress| {}).await {
//!     TransferOutcome::Completed { bytes, .. } => println!("{bytes} bytes on disk"),
//!     other => println!("not finished: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
pub mod filename;
mod journal;
mod retry;
mod transfer;
mod verify;

pub use client::HttpClient;
pub use error::DownloadError;
pub use journal::{Journal, JournalEntry, JournalStore};
pub use retry::{DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use transfer::{ProgressFn, TransferOutcome, TransferWorker};
pub use verify::{Sha256Verifier, TransferVerifier};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
