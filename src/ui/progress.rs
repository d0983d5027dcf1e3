use crate::ui::icons::CHECK;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A spinner for a single wait. The caller ticks it (or enables a steady
/// tick) and clears it with `finish_and_clear`.
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .expect("progress bar template is a valid static string");
    let bar = ProgressBar::new_spinner();
    bar.set_style(style);
    bar.set_message(message.into());
    bar
}

/// Spinner that animates itself until finished.
pub fn steady_spinner(message: impl Into<String>) -> ProgressBar {
    let bar = spinner(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Progress over a fixed number of items, advanced one item at a time.
/// Clones share the same bar.
#[derive(Clone)]
pub struct CountProgress {
    bar: ProgressBar,
}

impl CountProgress {
    pub fn new(total: u64, prefix: &str) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");
        let bar = ProgressBar::new(total);
        bar.set_style(style);
        bar.set_prefix(prefix.to_string());
        Self { bar }
    }

    /// A bar that never draws.
    pub fn hidden(total: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total);
        Self { bar }
    }

    /// Change the number of items once it is known.
    pub fn set_total(&self, total: u64) {
        self.bar.set_length(total);
    }

    pub fn advance(&self, message: &str) {
        self.bar.set_message(message.to_string());
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Print a line above the bar without tearing it.
    pub fn println(&self, msg: impl AsRef<str>) {
        self.bar.println(msg.as_ref());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// `✅ message`
pub fn print_ok(message: &str) {
    println!("{CHECK}{message}");
}
