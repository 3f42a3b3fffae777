//! Statement progress display for the replay command.

use crate::replay::ReplayOutcome;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner showing running applied/failed counts.
///
/// Cloning shares the same underlying bar, so one handle can be moved into
/// the replay progress callback while the command keeps another to finish it.
#[derive(Clone)]
pub struct ReplayProgress {
    bar: ProgressBar,
}

impl ReplayProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {pos} stmt ({per_sec}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn update(&self, outcome: &ReplayOutcome) {
        self.bar.set_position(outcome.attempted());
        if outcome.failed_count > 0 {
            self.bar.set_message(format!(
                "{} applied, {} failed",
                outcome.applied_count, outcome.failed_count
            ));
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ReplayProgress {
    fn default() -> Self {
        Self::new()
    }
}
