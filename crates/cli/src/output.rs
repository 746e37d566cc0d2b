//! Output formatting utilities

use clap::ValueEnum;
use colored::{Color, Colorize};
use glove_lib::ComponentStatus;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Rounded tables and colored status lines
    #[default]
    Table,
    /// Pretty JSON, or one JSON object per line for streamed readings
    Json,
}

/// Rows as a rounded table, or a JSON array; `empty` is shown instead of an
/// empty table
pub fn print_table<T: Tabled + Serialize>(rows: &[T], format: OutputFormat, empty: &str) {
    match format {
        OutputFormat::Json => print_json(rows),
        OutputFormat::Table if rows.is_empty() => print_warning(empty),
        OutputFormat::Table => println!("{}", Table::new(rows).with(Style::rounded())),
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

fn symbol_line(symbol: &str, color: Color, message: &str) -> String {
    format!("{} {}", symbol.color(color).bold(), message)
}

pub fn print_success(message: &str) {
    println!("{}", symbol_line("✓", Color::Green, message));
}

/// Errors go to stderr so JSON output stays parseable
pub fn print_error(message: &str) {
    eprintln!("{}", symbol_line("✗", Color::Red, message));
}

pub fn print_warning(message: &str) {
    println!("{}", symbol_line("⚠", Color::Yellow, message));
}

pub fn print_info(message: &str) {
    println!("{}", symbol_line("ℹ", Color::Blue, message));
}

/// Accuracy in [0, 1] as a percentage
pub fn format_accuracy(accuracy: f32) -> String {
    format!("{:.1}%", accuracy * 100.0)
}

/// Sensor readings or scores rounded for display
pub fn format_values(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| format!("{:.1}", v))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn color_status(status: ComponentStatus) -> String {
    let color = match status {
        ComponentStatus::Healthy => Color::Green,
        ComponentStatus::Degraded => Color::Yellow,
        ComponentStatus::Unhealthy => Color::Red,
    };
    status.as_str().color(color).to_string()
}

pub fn color_readiness(ready: bool) -> String {
    if ready {
        "ready".green().to_string()
    } else {
        "not ready".red().to_string()
    }
}

/// Green once a classifier separates the gestures, red near chance
pub fn color_accuracy(accuracy: f32) -> String {
    let color = match accuracy {
        a if a >= 0.9 => Color::Green,
        a if a >= 0.6 => Color::Yellow,
        _ => Color::Red,
    };
    format_accuracy(accuracy).color(color).to_string()
}
