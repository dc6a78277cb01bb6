//! Post-transfer verification hooks.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::constants::WRITE_CHUNK_SIZE;
use super::error::DownloadError;
use crate::extract::DownloadLink;

/// Checks a finished file before its task is reported as completed.
///
/// A rejection fails the task with [`DownloadError::Verification`]; the file is
/// left on disk for inspection.
#[async_trait]
pub trait TransferVerifier: Send + Sync {
    /// Verifies the file at `path` downloaded from `link`.
    async fn verify(&self, link: &DownloadLink, path: &Path) -> Result<(), DownloadError>;
}

/// Compares SHA-256 digests against caller-supplied values keyed by URL.
///
/// Files whose URL has no registered digest pass.
#[derive(Debug, Clone, Default)]
pub struct Sha256Verifier {
    digests: HashMap<String, String>,
}

impl Sha256Verifier {
    /// Creates a verifier with no digests.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the expected hex digest for `url`.
    #[must_use]
    pub fn with_digest(mut self, url: impl Into<String>, hex_digest: impl Into<String>) -> Self {
        self.digests
            .insert(url.into(), hex_digest.into().trim().to_ascii_lowercase());
        self
    }
}

#[async_trait]
impl TransferVerifier for Sha256Verifier {
    async fn verify(&self, link: &DownloadLink, path: &Path) -> Result<(), DownloadError> {
        let Some(expected) = self.digests.get(link.url.as_str()) else {
            return Ok(());
        };

        let actual = sha256_file(path).await?;
        if &actual == expected {
            debug!(path = %path.display(), "sha256 verified");
            Ok(())
        } else {
            Err(DownloadError::verification(
                path,
                format!("sha256 mismatch: expected {expected}, got {actual}"),
            ))
        }
    }
}

async fn sha256_file(path: &Path) -> Result<String, DownloadError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; WRITE_CHUNK_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
