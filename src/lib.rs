//! Page Downloader Core Library
//!
//! Discovers downloadable file links on a web page and retrieves them
//! concurrently, resuming interrupted transfers with HTTP range requests.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`extract`] - Link discovery (site strategies + extension fallback)
//! - [`download`] - Resumable single-file transfers, retry, verification, journal
//! - [`scheduler`] - Bounded worker pool with pause/resume/cancel
//! - [`pipeline`] - Page fetch -> links -> per-file destinations -> scheduler
//! - [`config`] - Session configuration and the JSON config file
//! - [`events`] - Task events for progress display

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod events;
pub mod extract;
pub mod pipeline;
pub mod scheduler;
pub mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig, SessionConfig, SiteRule};
pub use download::{
    DownloadError, HttpClient, RetryPolicy, Sha256Verifier, TransferOutcome, TransferVerifier,
    TransferWorker,
};
pub use events::{EventKind, TaskEvent, TransferProgress};
pub use extract::{DownloadLink, LinkExtractor, LinkStrategy};
pub use pipeline::{ExtractionPipeline, PipelineError, PipelineRun, Plan};
pub use scheduler::{DownloadScheduler, DownloadSummary, DownloadTask, RunSignal, TaskId, TaskState};
