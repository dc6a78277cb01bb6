//! Link discovery on downloaded pages.
//!
//! A [`LinkExtractor`] holds a [`StrategyRegistry`] of site-specific
//! [`LinkStrategy`] implementations plus a generic [`ExtensionFallback`].
//! Every strategy whose host pattern matches the page contributes links, in
//! registration order. When none of them produces a link the fallback scans
//! every anchor for an allow-listed file extension.
//!
//! Extraction is pure: no I/O, and a page without links yields an empty
//! vector rather than an error.
//!
//! # Example
//!
//! ```
//! use page_downloader::config::SessionConfig;
//! use page_downloader::extract::LinkExtractor;
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = LinkExtractor::from_config(&SessionConfig::default())?;
//! let page = Url::parse("https://example.com/games/demo")?;
//! let links = extractor.extract(r#"<a href="/files/demo.zip">zip</a>"#, &page);
//! assert_eq!(links[0].url.as_str(), "https://example.com/files/demo.zip");
//! # Ok(())
//! # }
//! ```

mod generic;
mod registry;
mod selector;

use std::collections::HashSet;

use scraper::{ElementRef, Html};
use tracing::{debug, instrument};
use url::Url;

pub use generic::ExtensionFallback;
pub use registry::StrategyRegistry;
pub use selector::SelectorStrategy;

use crate::config::{ConfigError, SessionConfig};

/// A discovered download link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    /// Absolute URL of the file (or an opaque URI such as `magnet:`).
    pub url: Url,
    /// File name suggested by the page (the anchor's `download` attribute).
    pub suggested_filename: Option<String>,
}

impl DownloadLink {
    /// Creates a link without a suggested file name.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            suggested_filename: None,
        }
    }

    /// Sets the suggested file name.
    #[must_use]
    pub fn with_suggested_filename(mut self, name: impl Into<String>) -> Self {
        self.suggested_filename = Some(name.into());
        self
    }

    /// Identity used for deduplication: the URL without its fragment.
    #[must_use]
    pub fn normalized_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }

    /// Whether the link can be fetched over HTTP(S).
    #[must_use]
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }
}

/// A page-structure strategy that finds download links in a parsed document.
pub trait LinkStrategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Whether this strategy applies to pages served from `host`.
    fn matches(&self, host: &str) -> bool;

    /// Collects links from `document`, resolving relative references against `base`.
    fn extract(&self, document: &Html, base: &Url) -> Vec<DownloadLink>;
}

/// Site strategies with a generic extension fallback.
#[derive(Debug)]
pub struct LinkExtractor {
    registry: StrategyRegistry,
    fallback: ExtensionFallback,
}

impl LinkExtractor {
    /// Creates an extractor from an explicit registry and fallback.
    #[must_use]
    pub fn new(registry: StrategyRegistry, fallback: ExtensionFallback) -> Self {
        Self { registry, fallback }
    }

    /// Compiles the configured site rules and extension allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHostPattern`] or
    /// [`ConfigError::InvalidSelector`] for a rule that does not compile, and
    /// [`ConfigError::EmptyExtension`] for an unusable extension list.
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        let mut registry = StrategyRegistry::new();
        for rule in &config.site_rules {
            registry.register(Box::new(SelectorStrategy::from_rule(rule)?));
        }
        let fallback = ExtensionFallback::new(config.fallback_extensions.iter())?;
        Ok(Self::new(registry, fallback))
    }

    /// Extracts the deduplicated download links of a page, in first-seen order.
    #[instrument(skip(self, page_content), fields(url = %source_url))]
    pub fn extract(&self, page_content: &str, source_url: &Url) -> Vec<DownloadLink> {
        let document = Html::parse_document(page_content);
        let host = source_url.host_str().unwrap_or_default();

        let mut links = Vec::new();
        for strategy in self.registry.matching(host) {
            let found = strategy.extract(&document, source_url);
            debug!(strategy = strategy.name(), count = found.len(), "site strategy applied");
            links.extend(found);
        }

        if links.is_empty() {
            links = self.fallback.extract(&document, source_url);
            debug!(count = links.len(), "extension fallback applied");
        }

        dedup_links(links)
    }
}

/// Removes links whose normalized URL was already seen, keeping the first.
fn dedup_links(links: Vec<DownloadLink>) -> Vec<DownloadLink> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| seen.insert(link.normalized_key()))
        .collect()
}

/// Resolves an anchor's `href` against `base`, dropping non-file schemes.
pub(crate) fn link_from_anchor(anchor: ElementRef<'_>, base: &Url) -> Option<DownloadLink> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = base.join(href).ok()?;
    if matches!(url.scheme(), "javascript" | "mailto" | "tel" | "data") {
        return None;
    }

    let link = DownloadLink::new(url);
    match anchor.value().attr("download").map(str::trim) {
        Some(name) if !name.is_empty() => Some(link.with_suggested_filename(name)),
        _ => Some(link),
    }
}
