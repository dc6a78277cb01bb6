//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use page_downloader::SessionConfig;

/// Download every file linked from a game page.
///
/// Page-downloader fetches the page, finds its download links (site rules
/// first, then archive extensions), and downloads them concurrently into
/// `<output-dir>/<page name>/`, resuming partial files from earlier runs.
#[derive(Parser, Debug)]
#[command(name = "page-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Page URL to scan for download links
    pub url: String,

    /// Root directory; files land in a subdirectory named after the page
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// JSON config file supplying defaults (explicit flags win)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum concurrent downloads (1-64)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub concurrency: Option<u8>,

    /// Per-request connect/read timeout in seconds (1-3600)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// User-Agent header sent with every request
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Extra request header, repeatable (NAME:VALUE)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Comma-separated extensions accepted by the generic fallback
    #[arg(long, value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Maximum attempts per file for transient failures (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: Option<u32>,

    /// Delete partial files when downloads are cancelled
    #[arg(long)]
    pub delete_on_cancel: bool,

    /// Do not read or write the resume journal
    #[arg(long)]
    pub no_journal: bool,

    /// Print the final summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Applies explicitly given flags on top of `config`.
    pub fn apply_to(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(dir) = &self.output_dir {
            config.destination_root.clone_from(dir);
        }
        if let Some(concurrency) = self.concurrency {
            config.max_workers = usize::from(concurrency);
        }
        if let Some(secs) = self.timeout {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(agent) = &self.user_agent {
            config.user_agent.clone_from(agent);
        }
        config.headers.extend(self.headers.iter().cloned());
        if let Some(extensions) = &self.extensions {
            config.fallback_extensions.clone_from(extensions);
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if self.delete_on_cancel {
            config.delete_partial_on_cancel = true;
        }
        if self.no_journal {
            config.journal = false;
        }
        config
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
