//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use sitegate_common::{ComparisonResult, Status};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
    }
}

fn status_color(status: Status) -> Color {
    match status {
        Status::Pass => Color::Green,
        Status::Fail | Status::Error => Color::Red,
        Status::Warn => Color::Yellow,
        Status::Improvement => Color::Blue,
    }
}

/// Per-path results with colored status cells
pub fn print_results(results: &[ComparisonResult]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Path", "Status", "Diff", "Detail"]);

    for result in results {
        let diff = result
            .diff
            .as_ref()
            .map(|d| format!("{:.3}%", d.reported_percentage()))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&result.path),
            Cell::new(result.status).fg(status_color(result.status)),
            Cell::new(diff),
            Cell::new(result.reason()),
        ]);
    }

    println!("{table}");
}

/// Colored status badge for single-line output
pub fn status_badge(status: Status) -> String {
    let label = status.to_string();
    match status {
        Status::Pass => label.green().bold().to_string(),
        Status::Fail | Status::Error => label.red().bold().to_string(),
        Status::Warn => label.yellow().bold().to_string(),
        Status::Improvement => label.blue().bold().to_string(),
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}
