//! Run-level errors of the extraction pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop a run before any transfer starts.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The page could not be fetched, or it contains no download links.
    #[error("link discovery failed for {url}: {reason}")]
    LinkDiscovery {
        /// The page URL.
        url: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The destination directory could not be created.
    #[error("cannot create directory {path}: {source}")]
    Directory {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The session configuration is unusable.
    #[error("invalid configuration: {source}")]
    Config {
        /// The underlying configuration error.
        #[source]
        source: ConfigError,
    },
}

impl PipelineError {
    /// Creates a link discovery error.
    pub fn link_discovery(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LinkDiscovery {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a directory error.
    pub fn directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Directory {
            path: path.into(),
            source,
        }
    }

    /// Wraps a configuration error.
    pub fn config(source: ConfigError) -> Self {
        Self::Config { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_discovery_display() {
        let error = PipelineError::link_discovery("https://x.example/page", "no download links found");
        let msg = error.to_string();
        assert!(msg.contains("https://x.example/page"));
        assert!(msg.contains("no download links found"));
    }

    #[test]
    fn test_directory_display() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = PipelineError::directory("/root/x", io);
        assert!(error.to_string().contains("/root/x"));
    }
}
