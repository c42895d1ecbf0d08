//! Progress collaborators for the aggregator.

use crate::{truncate_chars, CaptureOutcome, ProgressSink};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{info, warn};

const DETAIL_WIDTH: usize = 120;

/// Discards every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_outcome(&self, _outcome: &CaptureOutcome) {}
    fn on_progress(&self, _current: usize, _total: usize) {}
}

/// Outcome lines through `tracing`, for runs without a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_outcome(&self, outcome: &CaptureOutcome) {
        if outcome.success {
            info!("{}", outcome_line(outcome));
        } else {
            warn!("{}", outcome_line(outcome));
        }
    }

    fn on_progress(&self, current: usize, total: usize) {
        tracing::debug!(current, total, "progress");
    }
}

/// indicatif bar with per-endpoint lines printed above it.
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message("capturing");
        Self { bar }
    }

    /// A bar that draws nowhere; used in tests.
    pub fn hidden(total: usize) -> Self {
        let progress = Self::new(total);
        progress.bar.set_draw_target(ProgressDrawTarget::hidden());
        progress
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_outcome(&self, outcome: &CaptureOutcome) {
        self.bar.println(outcome_line(outcome));
    }

    fn on_progress(&self, current: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(current as u64);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// `[+] url` for successes, `[x] url - detail` for failures.
pub fn outcome_line(outcome: &CaptureOutcome) -> String {
    if outcome.success {
        format!("[+] {}", outcome.url)
    } else {
        let detail = outcome.error_detail.replace('\n', " ");
        format!("[x] {} - {}", outcome.url, truncate_chars(&detail, DETAIL_WIDTH))
    }
}
