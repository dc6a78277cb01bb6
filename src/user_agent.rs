//! Shared User-Agent strings for page and file requests.
//!
//! Many mirror hosts reject non-browser agents, so the default request identity
//! is a desktop browser string. The tool identity is kept separately for logs.

/// Desktop browser User-Agent sent with every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Tool identification used in startup logs.
#[must_use]
pub fn tool_identity() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("page-downloader/{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent_looks_like_browser() {
        assert!(DEFAULT_USER_AGENT.starts_with("Mozilla/5.0"));
        assert!(!DEFAULT_USER_AGENT.contains("  "));
    }

    #[test]
    fn test_tool_identity_contains_crate_version() {
        let identity = tool_identity();
        assert_eq!(
            identity.strip_prefix("page-downloader/"),
            Some(env!("CARGO_PKG_VERSION"))
        );
    }
}
