//! HTTP client wrapper shared by page fetching and file transfers.
//!
//! One [`HttpClient`] is built per run from the [`SessionConfig`] and cloned
//! into every worker so they share reqwest's connection pool.

use reqwest::header::RANGE;
use reqwest::{Client, Response};
use tracing::{debug, instrument};
use url::Url;

use super::error::DownloadError;
use crate::config::{ConfigError, SessionConfig};

/// HTTP client with the session's headers and timeouts applied.
///
/// Cloning is cheap: clones share the underlying connection pool.
///
/// # Example
///
/// ```no_run
/// use page_downloader::config::SessionConfig;
/// use page_downloader::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::from_config(&SessionConfig::default())?;
/// let url = url::Url::parse("https://example.com/games/some-game")?;
/// let html = client.fetch_page(&url).await?;
/// println!("fetched {} bytes", html.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client from the session configuration.
    ///
    /// The configured timeout bounds connection setup and each body read, not
    /// the whole transfer, so large files are not cut off. No transparent
    /// decompression is enabled: resume offsets must refer to bytes on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHeader`] for unusable headers and
    /// [`ConfigError::HttpClient`] if the TLS backend cannot be initialized.
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .default_headers(config.header_map()?)
            .connect_timeout(config.request_timeout)
            .read_timeout(config.request_timeout)
            .build()
            .map_err(|source| ConfigError::HttpClient { source })?;
        Ok(Self { client })
    }

    /// Fetches a page and returns its body as text.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::HttpStatus`] for non-2xx responses and
    /// [`DownloadError::Network`]/[`DownloadError::Timeout`] on transport failure.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_page(&self, url: &Url) -> Result<String, DownloadError> {
        let response = self.get(url, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;
        debug!(bytes = body.len(), "page fetched");
        Ok(body)
    }

    /// Sends a GET, with `Range: bytes=<offset>-` when `range_start` is given.
    ///
    /// The status is not checked: 200, 206 and 416 all mean something to a
    /// resuming transfer.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`]/[`DownloadError::Timeout`] when no
    /// response arrives.
    pub async fn get(&self, url: &Url, range_start: Option<u64>) -> Result<Response, DownloadError> {
        let mut request = self.client.get(url.clone());
        if let Some(offset) = range_start {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        request
            .send()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))
    }
}
