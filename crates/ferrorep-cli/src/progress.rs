//! Live progress bar for the CLI

use console::style;
use ferrorep_types::{FailureRecord, ProgressSink, ProgressUpdate, ReplicationResult, RunId};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress sink that drives an indicatif bar
#[derive(Debug, Clone)]
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    /// Create a visible bar, or a hidden one in quiet mode
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(100);
            if let Ok(bar_style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix:.bold} [{wide_bar:.cyan/blue}] {pos:>3}% {msg}")
            {
                bar.set_style(bar_style.progress_chars("█▉▊▋▌▍▎▏  "));
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self { bar }
    }

    /// Remove the bar without printing a final line
    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for ConsoleProgress {
    fn report_progress(&self, update: &ProgressUpdate) {
        self.bar.set_prefix(update.phase.to_string());
        self.bar.set_position(u64::from(update.percent));
        let rate = if update.throughput_mbps > 0.0 {
            format!(" - {:.1} MB/s", update.throughput_mbps)
        } else {
            String::new()
        };
        self.bar.set_message(format!(
            "{}/{} {}{}",
            update.processed, update.total, update.current_item, rate
        ));
    }

    fn report_failure(&self, _run_id: RunId, failure: &FailureRecord) {
        self.bar.println(format!(
            "  {} {} {}",
            style("✗").red(),
            failure.item,
            style(&failure.reason).dim()
        ));
    }

    fn report_completion(&self, _result: &ReplicationResult) {
        self.bar.finish_and_clear();
    }
}
