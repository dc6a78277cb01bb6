//! Generic extension-based link discovery.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use super::{DownloadLink, link_from_anchor};
use crate::config::{ConfigError, normalize_extension};

#[allow(clippy::expect_used)]
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector is valid"));

/// Keeps every anchor whose resolved path ends with an allow-listed extension.
///
/// Matching ignores case and looks only at the URL path, so query strings
/// and fragments never hide or fake an extension.
#[derive(Debug, Clone)]
pub struct ExtensionFallback {
    extensions: Vec<String>,
}

impl ExtensionFallback {
    /// Creates a fallback for the given extensions (`zip`, `.ZIP` and `.zip` are equal).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyExtension`] when an entry is blank.
    pub fn new<I, S>(extensions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .collect::<Vec<_>>();
        if extensions.iter().any(|ext| ext.len() <= 1) {
            return Err(ConfigError::EmptyExtension);
        }
        Ok(Self { extensions })
    }

    /// Whether the URL path ends with one of the allow-listed extensions.
    #[must_use]
    pub fn accepts(&self, url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }

    /// Scans all anchors of `document`.
    #[must_use]
    pub fn extract(&self, document: &Html, base: &Url) -> Vec<DownloadLink> {
        document
            .select(&ANCHOR_SELECTOR)
            .filter_map(|anchor| link_from_anchor(anchor, base))
            .filter(|link| self.accepts(&link.url))
            .collect()
    }
}
