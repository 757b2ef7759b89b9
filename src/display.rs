use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::player::session::Status;

/// `m:ss`, minutes and seconds both floored.
pub fn format_time(time: Duration) -> String {
    let secs = time.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Single status line: transport button, title, times, volume and meter.
pub struct StatusLine {
    bar: ProgressBar,
}

impl StatusLine {
    pub fn new() -> anyhow::Result<Self> {
        let bar = ProgressBar::new(1);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{prefix:>5}] {bar:20.cyan/blue} {msg}")?
                .progress_chars("=>-"),
        );
        Ok(Self { bar })
    }

    pub fn update(&self, status: &Status<'_>) {
        let total = status.total.unwrap_or_default();
        self.bar.set_length(total.as_secs().max(1));
        self.bar.set_position(status.elapsed.as_secs());
        self.bar.set_prefix(status.button_label);
        self.bar.set_message(format!(
            "{} / {}  vol {:.1}  {}  {}",
            format_time(status.elapsed),
            format_time(total),
            status.volume,
            status.grid.to_text(),
            status.title,
        ));
    }

    /// Runs `f` with the status line hidden, for printing other output.
    pub fn suspend<F: FnOnce()>(&self, f: F) {
        self.bar.suspend(f);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
