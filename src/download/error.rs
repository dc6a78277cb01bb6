//! Error types for the download module.
//!
//! Every variant is scoped to a single transfer. The scheduler records these in
//! the run summary and never propagates them to the caller of a run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring one file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, reset mid-body, TLS).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out (connect or read).
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Unexpected HTTP status (anything other than 200, or 206 for a resume).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing the destination file.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The URL is malformed or not an HTTP(S) URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Final on-disk size disagrees with the confirmed remote total.
    #[error("size mismatch for {path}: expected {expected_bytes} bytes, got {actual_bytes}")]
    SizeMismatch {
        /// Destination path that failed the check.
        path: PathBuf,
        /// Remote total in bytes.
        expected_bytes: u64,
        /// Bytes found on disk.
        actual_bytes: u64,
    },

    /// The server ignored a resume offset and the restart from zero also failed.
    #[error("server ignored range request for {url} at offset {offset}")]
    RangeNotSupported {
        /// The URL that was being resumed.
        url: String,
        /// The requested resume offset.
        offset: u64,
    },

    /// A verification hook rejected the finished file.
    #[error("verification failed for {path}: {reason}")]
    Verification {
        /// Destination path that failed verification.
        path: PathBuf,
        /// Human-readable rejection reason.
        reason: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a size mismatch error.
    pub fn size_mismatch(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::SizeMismatch {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a range-not-supported error.
    pub fn range_not_supported(url: impl Into<String>, offset: u64) -> Self {
        Self::RangeNotSupported {
            url: url.into(),
            offset,
        }
    }

    /// Creates a verification error.
    pub fn verification(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Verification {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path that the source error does not carry.
