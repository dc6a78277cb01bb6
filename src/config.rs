//! Session configuration shared read-only by every part of a run.
//!
//! [`SessionConfig`] is built once (defaults, then an optional JSON
//! [`FileConfig`], then explicit caller overrides), validated, and wrapped in an
//! `Arc` for the pipeline, scheduler and workers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;

use crate::download::constants::REQUEST_TIMEOUT_SECS;
use crate::download::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use crate::user_agent::DEFAULT_USER_AGENT;

/// Default number of concurrently active transfers.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Minimum allowed worker count.
const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 64;

/// Default fallback allow-list of archive extensions.
pub const DEFAULT_FALLBACK_EXTENSIONS: [&str; 4] = [".rar", ".zip", ".001", ".7z"];

/// Errors raised while building or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Worker count outside the accepted range.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkerCount {
        /// The rejected value.
        value: usize,
    },

    /// Request timeout of zero.
    #[error("request timeout must be greater than zero")]
    InvalidTimeout,

    /// A site rule's host pattern is not a valid regular expression.
    #[error("invalid host pattern `{pattern}`: {source}")]
    InvalidHostPattern {
        /// The rejected pattern.
        pattern: String,
        /// The regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// A site rule's CSS selector does not parse.
    #[error("invalid link selector `{selector}`: {reason}")]
    InvalidSelector {
        /// The rejected selector.
        selector: String,
        /// Parser message.
        reason: String,
    },

    /// A header name or value cannot be sent over HTTP.
    #[error("invalid request header `{name}`")]
    InvalidHeader {
        /// The header name as supplied.
        name: String,
    },

    /// The fallback extension allow-list contains an empty entry.
    #[error("fallback extensions must not contain empty entries")]
    EmptyExtension,

    /// The HTTP client could not be built from this configuration.
    #[error("cannot build HTTP client: {source}")]
    HttpClient {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`FileConfig`].
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// One site-specific extraction rule: a host pattern and the anchors to collect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteRule {
    /// Regular expression matched against the page host (e.g. `fitgirl-repacks`).
    pub host_pattern: String,
    /// CSS selector for the anchor elements whose `href` is a download link.
    pub selector: String,
}

impl SiteRule {
    /// Creates a rule from a host pattern and a CSS selector.
    pub fn new(host_pattern: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            host_pattern: host_pattern.into(),
            selector: selector.into(),
        }
    }
}

/// Built-in site rules, tried before the generic extension fallback.
#[must_use]
pub fn default_site_rules() -> Vec<SiteRule> {
    let torrent_links = r#"a[href*="magnet:?"], a[href*=".torrent"]"#;
    vec![
        SiteRule::new("fitgirl-repacks", torrent_links),
        SiteRule::new("ovagames", r#"a[href*="uploadhaven"], a[href*="mega.nz"]"#),
        SiteRule::new("dodi-repacks", torrent_links),
    ]
}

/// Immutable per-run configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum number of concurrently active transfers.
    pub max_workers: usize,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Additional static request headers.
    pub headers: Vec<(String, String)>,
    /// Connect and read timeout applied to each request.
    pub request_timeout: Duration,
    /// Root directory under which per-page directories are created.
    pub destination_root: PathBuf,
    /// Ordered site-specific extraction rules.
    pub site_rules: Vec<SiteRule>,
    /// Extensions accepted by the generic fallback (compared case-insensitively).
    pub fallback_extensions: Vec<String>,
    /// Maximum transfer attempts per task (including the first).
    pub max_attempts: u32,
    /// Remove the partial file when a transfer is cancelled.
    pub delete_partial_on_cancel: bool,
    /// Record per-directory resume state next to the downloaded files.
    pub journal: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: Vec::new(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            destination_root: PathBuf::from("."),
            site_rules: default_site_rules(),
            fallback_extensions: DEFAULT_FALLBACK_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delete_partial_on_cancel: false,
            journal: true,
        }
    }
}

impl SessionConfig {
    /// Sets the maximum number of concurrent transfers.
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds a static request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the destination root directory.
    #[must_use]
    pub fn with_destination_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.destination_root = root.into();
        self
    }

    /// Replaces the site rules.
    #[must_use]
    pub fn with_site_rules(mut self, rules: Vec<SiteRule>) -> Self {
        self.site_rules = rules;
        self
    }

    /// Replaces the fallback extension allow-list.
    #[must_use]
    pub fn with_fallback_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the maximum attempts per task.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Removes partial files of cancelled transfers.
    #[must_use]
    pub fn with_delete_partial_on_cancel(mut self, delete: bool) -> Self {
        self.delete_partial_on_cancel = delete;
        self
    }

    /// Enables or disables the resume journal.
    #[must_use]
    pub fn with_journal(mut self, enabled: bool) -> Self {
        self.journal = enabled;
        self
    }

    /// Retry policy derived from `max_attempts` with default backoff.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_attempts)
    }

    /// Fallback extensions normalized to lowercase with a leading dot.
    #[must_use]
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.fallback_extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .filter(|ext| ext.len() > 1)
            .collect()
    }

    /// Builds the default header map (User-Agent plus static headers).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHeader`] for names or values that are not
    /// valid HTTP header tokens.
    pub fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(&self.user_agent).map_err(|_| {
            ConfigError::InvalidHeader {
                name: USER_AGENT.as_str().to_string(),
            }
        })?;
        headers.insert(USER_AGENT, agent);

        for (name, value) in &self.headers {
            let header_name =
                HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| {
                    ConfigError::InvalidHeader { name: name.clone() }
                })?;
            let header_value = HeaderValue::from_str(value.trim())
                .map_err(|_| ConfigError::InvalidHeader { name: name.clone() })?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }

    /// Validates values that cannot be enforced by the type system.
    ///
    /// Site rules are validated when the extractor compiles them.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.max_workers) {
            return Err(ConfigError::InvalidWorkerCount {
                value: self.max_workers,
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if self
            .fallback_extensions
            .iter()
            .any(|ext| normalize_extension(ext).len() <= 1)
        {
            return Err(ConfigError::EmptyExtension);
        }
        self.header_map()?;
        Ok(())
    }
}

/// Lowercases an extension and ensures a single leading dot (`ZIP` -> `.zip`).
#[must_use]
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_lowercase())
}

/// JSON-backed file configuration; every field is optional.
///
/// ```json
/// {
///   "max_workers": 2,
///   "request_timeout_secs": 60,
///   "fallback_extensions": [".zip", ".rar"],
///   "site_rules": [{ "host_pattern": "example", "selector": "a.download" }]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default maximum concurrent transfers.
    pub max_workers: Option<usize>,
    /// Default `User-Agent`.
    pub user_agent: Option<String>,
    /// Extra static headers as `name -> value`.
    pub headers: Option<Vec<(String, String)>>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Default destination root.
    pub destination_root: Option<PathBuf>,
    /// Site rules; replace the built-in rules when present.
    pub site_rules: Option<Vec<SiteRule>>,
    /// Fallback extension allow-list.
    pub fallback_extensions: Option<Vec<String>>,
    /// Maximum attempts per task.
    pub max_attempts: Option<u32>,
    /// Delete partial files on cancel.
    pub delete_partial_on_cancel: Option<bool>,
    /// Keep a resume journal.
    pub journal: Option<bool>,
}

impl FileConfig {
    /// Loads a config file from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies the present fields on top of `config`.
    #[must_use]
    pub fn apply_to(self, mut config: SessionConfig) -> SessionConfig {
        if let Some(value) = self.max_workers {
            config.max_workers = value;
        }
        if let Some(value) = self.user_agent {
            config.user_agent = value;
        }
        if let Some(value) = self.headers {
            config.headers.extend(value);
        }
        if let Some(value) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(value);
        }
        if let Some(value) = self.destination_root {
            config.destination_root = value;
        }
        if let Some(value) = self.site_rules {
            config.site_rules = value;
        }
        if let Some(value) = self.fallback_extensions {
            config.fallback_extensions = value;
        }
        if let Some(value) = self.max_attempts {
            config.max_attempts = value;
        }
        if let Some(value) = self.delete_partial_on_cancel {
            config.delete_partial_on_cancel = value;
        }
        if let Some(value) = self.journal {
            config.journal = value;
        }
        config
    }
}
