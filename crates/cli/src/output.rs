//! Output formatting for CLI

use cadence_e2e::{CaseOutcome, RunSummary};
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn print_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(value).unwrap_or_default()),
        _ => println!("{}", serde_json::to_string_pretty(value).unwrap_or_default()),
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if format != OutputFormat::Table {
        print_structured(items, format);
        return;
    }
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    let mut table = table();
    table.set_header(T::headers());
    for item in items {
        table.add_row(item.row());
    }
    println!("{table}");
}

/// Per-suite table, then failures, then a one-line total.
pub fn print_summary(summary: &RunSummary, format: OutputFormat) {
    if format != OutputFormat::Table {
        print_structured(summary, format);
        return;
    }

    let mut table = table();
    table.set_header(vec!["Suite", "Passed", "Failed", "Skipped", "Seed", "Duration"]);
    for suite in &summary.suites {
        let failed = Cell::new(suite.failed());
        let failed = if suite.is_success() { failed } else { failed.fg(Color::Red) };
        table.add_row(vec![
            Cell::new(&suite.name),
            Cell::new(suite.passed()).fg(Color::Green),
            failed,
            Cell::new(suite.skipped()).fg(Color::Yellow),
            Cell::new(suite.seed),
            Cell::new(format!("{} ms", suite.duration_ms)),
        ]);
    }
    println!("{table}");

    for suite in &summary.suites {
        if let Some(err) = &suite.error {
            println!("{} {}: {}", "✗".red(), suite.name.bold(), err);
        }
        for case in suite.cases.iter().filter(|c| c.outcome == CaseOutcome::Failed) {
            println!(
                "{} {} > {}\n    {}",
                "✗".red(),
                suite.name.bold(),
                case.name,
                case.error.as_deref().unwrap_or("unknown error").red()
            );
        }
    }

    let totals = format!(
        "{} passed, {} failed, {} skipped ({} ms)",
        summary.passed(),
        summary.failed(),
        summary.skipped(),
        summary.duration_ms()
    );
    if summary.is_success() {
        print_success(&totals);
    } else {
        print_error(&totals);
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message.red());
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message.yellow());
}
