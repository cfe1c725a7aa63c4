//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use puma_stats::Metrics;
use tabled::{settings::Style, Table, Tabled};

/// Output format for the polled metrics
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// mackerel-agent plugin lines (default)
    #[default]
    Mackerel,
    /// Flat JSON object of metric key to value
    Json,
    /// Table for a quick look from a terminal
    Table,
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Print the flat mapping as pretty JSON
pub fn print_json(metrics: &Metrics) -> Result<()> {
    let json = serde_json::to_string_pretty(metrics)?;
    println!("{}", json);
    Ok(())
}

/// Print the flat mapping as a table
pub fn print_table(metrics: &Metrics) {
    if metrics.is_empty() {
        println!("{}", "No metrics reported".yellow());
        return;
    }

    let rows: Vec<MetricRow> = metrics
        .iter()
        .map(|(key, value)| MetricRow {
            key: key.clone(),
            value: format_value(*value),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Integers without a fractional part, everything else as is
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(16777216.0), "16777216");
        assert_eq!(format_value(2.5), "2.5");
        assert_eq!(format_value(-3.0), "-3");
    }
}
