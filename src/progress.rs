//! Progress reporting for the traversal
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::traverse::{TraversalProgress, TraversalReport};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays traversal status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &TraversalProgress) {
        self.bar.set_message(progress_message(progress));
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn progress_message(progress: &TraversalProgress) -> String {
    format!(
        "Segments: {}/{} | Pages: {} | Items: {} | Rate: {:.0}/s | Queue: {} | Workers: {}/{}",
        progress.segments_completed,
        progress.segments,
        format_number(progress.pages_processed),
        format_number(progress.items_processed),
        progress.items_per_second(),
        progress.queue_depth,
        progress.active_consumers,
        progress.total_consumers,
    )
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the traversal
pub fn print_summary(report: &TraversalReport, counted: i64) {
    let title = if report.completed {
        style("Traverse Complete").green().bold()
    } else {
        style("Traverse Incomplete").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Run:").bold(), report.run_id);
    println!("  {} {}", style("Segments:").bold(), report.segments);
    println!(
        "  {} {} ({} items)",
        style("Pages:").bold(),
        format_number(report.pages_produced),
        format_number(report.items_produced)
    );
    println!("  {} {}", style("Counted:").bold(), counted);
    println!(
        "  {} {:.1}s ({:.0} items/sec)",
        style("Duration:").bold(),
        report.duration.as_secs_f64(),
        report.items_per_second()
    );
    if report.pages_failed > 0 {
        println!(
            "  {} {} pages ({} items dropped)",
            style("Failed:").yellow().bold(),
            format_number(report.pages_failed),
            format_number(report.items_dropped)
        );
    }
    if report.pages_unprocessed > 0 {
        println!(
            "  {} {} pages",
            style("Unprocessed:").yellow().bold(),
            format_number(report.pages_unprocessed)
        );
    }
    println!();
}

/// Print a header at the start of the traversal
pub fn print_header(table: &str, mode: &str, segments: usize, workers: usize) {
    println!();
    println!(
        "{} {}",
        style("table-traverse").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Table:").bold(), table);
    println!("  {} {}", style("Mode:").bold(), mode);
    println!("  {} {}", style("Segments:").bold(), segments);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!();
}
