//! Progress bar driven by scanner milestones

use indicatif::{ProgressBar, ProgressStyle};
use obdscan::ProgressSink;

/// Shows scan progress on a terminal progress bar
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(100)
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { bar }
    }

    /// Leave the final message on screen
    pub fn finish(&self) {
        self.bar.finish();
    }
}

impl ProgressSink for BarProgress {
    fn on_progress(&self, message: &str, percent: u8) {
        self.bar.set_position(u64::from(percent.min(100)));
        self.bar.set_message(message.to_string());
    }
}
