//! Spinner shown while a build runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// A ticking single-line spinner, hidden when `quiet` is set.
pub(crate) fn build_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .expect("static pattern")
            .tick_chars("/-\\|"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
