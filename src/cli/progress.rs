//! Progress bar and summary reporting for CLI commands.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::event::ActivationOutcome;
use crate::fill::FillProgress;
use crate::stats::FillStats;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Formats a byte count using binary units.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Formats a duration as seconds, or minutes and seconds past one minute.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

/// Reports fill progress on a terminal progress bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Creates an empty bar; it is sized once the fill starts.
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━━╌"),
        );
        Self { bar }
    }

    /// Removes the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl FillProgress for BarProgress {
    fn on_fill_start(&self, count: usize) {
        self.bar.set_length(count as u64);
        self.bar.enable_steady_tick(Duration::from_millis(250));
    }

    fn on_resource_fetched(&self, url: &str, bytes: u64) {
        self.bar.inc(1);
        self.bar.set_message(format!("{url} ({})", format_bytes(bytes)));
    }

    fn on_error(&self, url: &str, error: &str) {
        self.bar.println(format!("  failed: {url}: {error}"));
    }
}

/// Prints a summary of a fill.
pub fn print_fill_summary(title: &str, stats: &FillStats) {
    println!("\n{SEPARATOR}");
    println!("{title}");
    println!("{SEPARATOR}");
    println!("  Resources stored:  {}", stats.resources_stored);
    if stats.resources_stored > 0 {
        println!("  Total size:        {}", format_bytes(stats.total_bytes));
        println!("  Total time:        {}", format_duration(stats.elapsed));
        println!("  Average speed:     {}/s", format_bytes(stats.average_speed()));
    }
    if stats.resources_skipped > 0 {
        println!("  Already cached:    {}", stats.resources_skipped);
    }
    println!("{SEPARATOR}");
}

/// Prints the result of an activation.
pub fn print_activation(outcome: &ActivationOutcome) {
    match outcome {
        ActivationOutcome::Success(report) => {
            println!("Activated: {}", report.summary());
            for path in &report.evicted {
                println!("  evicted   {path}");
            }
        }
        ActivationOutcome::WipeAndReset { reason } => {
            println!("Activation failed, all stores wiped: {reason}");
        }
    }
}
