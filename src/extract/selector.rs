//! Site strategy driven by a host pattern and a CSS selector.

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::{DownloadLink, LinkStrategy, link_from_anchor};
use crate::config::{ConfigError, SiteRule};

/// Collects the anchors matching `selector` on hosts matching `host_pattern`.
#[derive(Debug)]
pub struct SelectorStrategy {
    name: String,
    host_pattern: Regex,
    selector: Selector,
}

impl SelectorStrategy {
    /// Compiles a strategy from raw pattern and selector strings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHostPattern`] or [`ConfigError::InvalidSelector`].
    pub fn new(
        name: impl Into<String>,
        host_pattern: &str,
        selector: &str,
    ) -> Result<Self, ConfigError> {
        let host_pattern = Regex::new(host_pattern).map_err(|source| {
            ConfigError::InvalidHostPattern {
                pattern: host_pattern.to_string(),
                source,
            }
        })?;
        let selector = Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: name.into(),
            host_pattern,
            selector,
        })
    }

    /// Compiles a configured [`SiteRule`], named after its host pattern.
    ///
    /// # Errors
    ///
    /// Same as [`SelectorStrategy::new`].
    pub fn from_rule(rule: &SiteRule) -> Result<Self, ConfigError> {
        Self::new(rule.host_pattern.clone(), &rule.host_pattern, &rule.selector)
    }
}

impl LinkStrategy for SelectorStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, host: &str) -> bool {
        self.host_pattern.is_match(host)
    }

    fn extract(&self, document: &Html, base: &Url) -> Vec<DownloadLink> {
        document
            .select(&self.selector)
            .filter_map(|anchor| link_from_anchor(anchor, base))
            .collect()
    }
}
