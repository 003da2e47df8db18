//! Progress bar and formatting utilities for the CLI

use dumpdisk_core::{format_duration, format_speed, ImageProgress};
use indicatif::{ProgressBar, ProgressStyle};

/// Format a size in bytes to human-readable binary units
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Create a progress bar for an operation
///
/// Unknown totals get a spinner that still counts bytes.
pub fn create_progress_bar(total: Option<u64>, operation: &str, silent: bool) -> ProgressBar {
    if silent {
        return ProgressBar::hidden();
    }

    let (pb, template) = match total {
        Some(t) => (
            ProgressBar::new(t),
            format!(
                "  {{spinner:.green}} {} [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} {{msg}}",
                operation
            ),
        ),
        None => (
            ProgressBar::new_spinner(),
            format!("  {{spinner:.green}} {} {{bytes}} {{msg}}", operation),
        ),
    };

    let style = ProgressStyle::default_bar()
        .template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");
    pb.set_style(style);

    pb
}

/// Status line shown next to the bar
pub fn progress_message(progress: &ImageProgress) -> String {
    let mut msg = format_speed(progress.speed_bps);
    if let Some(eta) = progress.eta_seconds() {
        msg.push_str(&format!(", ETA: {}", format_duration(eta)));
    }
    if progress.unreadable_sectors > 0 {
        msg.push_str(&format!(", {} bad sectors", progress.unreadable_sectors));
    }
    msg
}
