//! Page-to-tasks pipeline.
//!
//! [`ExtractionPipeline::prepare`] fetches a page, extracts its download links,
//! creates `<root>/<page name>/` and turns every HTTP(S) link into a
//! [`DownloadTask`] with a unique destination. Opaque links (magnet URIs and
//! other non-HTTP schemes) are returned separately for an external handler.
//! [`ExtractionPipeline::run`] hands the tasks to a [`DownloadScheduler`].

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};
use url::Url;

pub use error::PipelineError;

use crate::config::SessionConfig;
use crate::download::constants::JOURNAL_FILE_NAME;
use crate::download::filename::{
    UniqueNames, directory_name_from_url, filename_from_url, sanitize_filename,
};
use crate::download::{HttpClient, Journal};
use crate::extract::{DownloadLink, LinkExtractor};
use crate::scheduler::{DownloadScheduler, DownloadSummary, DownloadTask, TaskId};

/// Everything derived from one page before transfers start.
#[derive(Debug)]
pub struct Plan {
    /// Per-page directory the files land in.
    pub directory: PathBuf,
    /// One task per HTTP(S) link.
    pub tasks: Vec<DownloadTask>,
    /// Links that cannot be fetched over HTTP (e.g. magnet URIs).
    pub external: Vec<DownloadLink>,
}

/// Result of [`ExtractionPipeline::run`].
#[derive(Debug)]
pub struct PipelineRun {
    /// Per-page directory the files landed in.
    pub directory: PathBuf,
    /// Links handed back for an external handler.
    pub external: Vec<DownloadLink>,
    /// Scheduler summary.
    pub summary: DownloadSummary,
}

/// Fetches a page, discovers links and plans their destinations.
#[derive(Debug)]
pub struct ExtractionPipeline {
    client: HttpClient,
    extractor: LinkExtractor,
    config: Arc<SessionConfig>,
}

impl ExtractionPipeline {
    /// Creates a pipeline from its parts.
    #[must_use]
    pub fn new(client: HttpClient, extractor: LinkExtractor, config: Arc<SessionConfig>) -> Self {
        Self {
            client,
            extractor,
            config,
        }
    }

    /// Builds the client and extractor from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when the configuration is invalid.
    pub fn from_config(config: Arc<SessionConfig>) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::config)?;
        let client = HttpClient::from_config(&config).map_err(PipelineError::config)?;
        let extractor = LinkExtractor::from_config(&config).map_err(PipelineError::config)?;
        Ok(Self::new(client, extractor, config))
    }

    /// Fetches and plans `page_url` under `destination_root`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LinkDiscovery`] when the URL is invalid, the
    /// page cannot be fetched, or it has no links, and
    /// [`PipelineError::Directory`] when the target directory cannot be created.
    #[instrument(skip(self, destination_root), fields(root = %destination_root.display()))]
    pub async fn prepare(
        &self,
        page_url: &str,
        destination_root: &Path,
    ) -> Result<Plan, PipelineError> {
        let url = Url::parse(page_url.trim())
            .map_err(|e| PipelineError::link_discovery(page_url, format!("invalid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PipelineError::link_discovery(
                page_url,
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }

        let content = self
            .client
            .fetch_page(&url)
            .await
            .map_err(|e| PipelineError::link_discovery(url.as_str(), e.to_string()))?;
        let links = self.extractor.extract(&content, &url);
        if links.is_empty() {
            return Err(PipelineError::link_discovery(
                url.as_str(),
                "no download links found",
            ));
        }

        let directory = destination_root.join(directory_name_from_url(&url));
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| PipelineError::directory(&directory, e))?;

        let journal = if self.config.journal {
            Journal::load(&directory).await
        } else {
            Journal::default()
        };

        let mut names = UniqueNames::new();
        names.reserve(JOURNAL_FILE_NAME);
        let mut tasks = Vec::new();
        let mut external = Vec::new();
        for link in links {
            if !link.is_http() {
                debug!(url = %link.url, "non-HTTP link left for an external handler");
                external.push(link);
                continue;
            }
            let name = names.claim(&destination_name(&link));
            let expected_total = journal.confirmed_total(&name, link.url.as_str());
            let destination = directory.join(&name);
            tasks.push(
                DownloadTask::new(TaskId::next(), link, destination)
                    .with_expected_total(expected_total),
            );
        }

        info!(
            directory = %directory.display(),
            tasks = tasks.len(),
            external = external.len(),
            "page planned"
        );
        Ok(Plan {
            directory,
            tasks,
            external,
        })
    }

    /// Fetches and plans `page_url`, returning only the download tasks.
    ///
    /// # Errors
    ///
    /// Same as [`prepare`](Self::prepare).
    pub async fn plan(
        &self,
        page_url: &str,
        destination_root: &Path,
    ) -> Result<Vec<DownloadTask>, PipelineError> {
        Ok(self.prepare(page_url, destination_root).await?.tasks)
    }

    /// Plans `page_url` and runs its tasks on `scheduler`.
    ///
    /// # Errors
    ///
    /// Same as [`prepare`](Self::prepare); task failures are reported in the
    /// summary instead.
    pub async fn run(
        &self,
        scheduler: &Arc<DownloadScheduler>,
        page_url: &str,
        destination_root: &Path,
    ) -> Result<PipelineRun, PipelineError> {
        let plan = self.prepare(page_url, destination_root).await?;
        let summary = scheduler.run(plan.tasks).await;
        Ok(PipelineRun {
            directory: plan.directory,
            external: plan.external,
            summary,
        })
    }
}

/// File name for a link: the page's suggestion, else the last URL segment.
fn destination_name(link: &DownloadLink) -> String {
    link.suggested_filename
        .as_deref()
        .map(sanitize_filename)
        .filter(|name| !name.trim_matches('_').is_empty())
        .unwrap_or_else(|| filename_from_url(&link.url))
}
