//! Progress UI (one bar per file) driven by scheduler events.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use page_downloader::{EventKind, TaskEvent, TaskId};
use tokio::sync::mpsc;

const BAR_TEMPLATE: &str =
    "{prefix:30!} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} {msg}";
const SPINNER_TEMPLATE: &str = "{prefix:30!} {spinner} {bytes} {bytes_per_sec} {msg}";

/// Consumes events until the scheduler drops its sender.
///
/// When `visible` is false the events are drained without drawing.
pub(crate) fn spawn_progress_ui(
    visible: bool,
    mut events: mpsc::UnboundedReceiver<TaskEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let multi = if visible {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let mut bars: HashMap<TaskId, ProgressBar> = HashMap::new();

        while let Some(event) = events.recv().await {
            apply_event(&multi, &mut bars, event);
        }

        for bar in bars.values() {
            bar.abandon();
        }
    })
}

fn apply_event(multi: &MultiProgress, bars: &mut HashMap<TaskId, ProgressBar>, event: TaskEvent) {
    let bar = bars.entry(event.task_id).or_insert_with(|| {
        let bar = multi.add(ProgressBar::no_length());
        bar.set_style(spinner_style());
        bar
    });

    match event.kind {
        EventKind::Started { file_name } => {
            bar.set_prefix(file_name);
            bar.set_message("starting");
        }
        EventKind::Progress {
            bytes_written,
            total,
        } => {
            if let Some(total) = total
                && bar.length() != Some(total)
            {
                bar.set_length(total);
                bar.set_style(bar_style());
            }
            bar.set_position(bytes_written);
            bar.set_message("");
        }
        EventKind::Paused { .. } => bar.set_message("paused"),
        EventKind::Resumed { offset } => {
            bar.set_position(offset);
            bar.set_message("resuming");
        }
        EventKind::Completed { bytes } => {
            bar.set_length(bytes);
            bar.set_position(bytes);
            bar.finish_with_message("done");
        }
        EventKind::Failed { reason } => bar.abandon_with_message(format!("failed: {reason}")),
        EventKind::Cancelled => bar.abandon_with_message("cancelled"),
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(SPINNER_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_spinner())
}
