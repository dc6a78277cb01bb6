//! CLI entry point for the page downloader.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use page_downloader::{
    DownloadScheduler, DownloadSummary, ExtractionPipeline, FileConfig, PipelineRun,
    SessionConfig, user_agent,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

mod cli;
mod progress;

use cli::Args;

/// Exit status when the run finished but some files did not complete.
const EXIT_INCOMPLETE: u8 = 2;

/// Exit status of a forced second interrupt.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");
    info!(version = %user_agent::tool_identity(), "page-downloader starting");

    let config = Arc::new(build_config(&args)?);
    let pipeline = ExtractionPipeline::from_config(Arc::clone(&config))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let scheduler = Arc::new(
        DownloadScheduler::from_config(Arc::clone(&config))?.with_event_sender(events_tx),
    );
    let ui = progress::spawn_progress_ui(!args.quiet && !args.json, events_rx);
    let interrupts = spawn_interrupt_handler(Arc::clone(&scheduler));

    let outcome = pipeline
        .run(&scheduler, &args.url, &config.destination_root)
        .await;

    // Dropping the last scheduler handle closes the event channel.
    interrupts.abort();
    let _ = interrupts.await;
    drop(scheduler);
    let _ = ui.await;

    let run = outcome.with_context(|| format!("cannot download from {}", args.url))?;
    report(&run, args.json)?;

    if run.summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_INCOMPLETE))
    }
}

/// Defaults, then the config file, then explicit flags.
fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = SessionConfig::default();
    if let Some(path) = &args.config {
        config = FileConfig::load(path)?.apply_to(config);
        debug!(path = %path.display(), "config file applied");
    }
    let config = args.apply_to(config);
    config.validate()?;
    Ok(config)
}

/// First Ctrl-C cancels cooperatively; a second one exits immediately.
fn spawn_interrupt_handler(scheduler: Arc<DownloadScheduler>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received, cancelling downloads (press Ctrl-C again to quit now)");
        scheduler.cancel_all();
        drop(scheduler);

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(EXIT_INTERRUPTED);
        }
    })
}

fn report(run: &PipelineRun, json: bool) -> Result<()> {
    if json {
        let external: Vec<&str> = run.external.iter().map(|link| link.url.as_str()).collect();
        let body = serde_json::json!({
            "directory": run.directory,
            "external": external,
            "summary": run.summary,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    print_summary(&run.summary);
    if !run.external.is_empty() {
        println!("Links for an external handler:");
        for link in &run.external {
            println!("  {}", link.url);
        }
    }
    println!("Files in {}", run.directory.display());
    Ok(())
}

fn print_summary(summary: &DownloadSummary) {
    println!(
        "Completed: {}  Failed: {}  Cancelled: {}",
        summary.completed.len(),
        summary.failed.len(),
        summary.cancelled.len()
    );
    for failed in &summary.failed {
        println!("  failed {}: {}", failed.destination.display(), failed.reason);
    }
    for cancelled in &summary.cancelled {
        println!("  cancelled {}", cancelled.destination.display());
    }
}
