//! CLI output rendering
//!
//! Every command renders through here: tables for humans, JSON for
//! scripts. Errors go to stderr in red; progress lines honor
//! `--quiet`.

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// How command output is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Invalid format: {}. Use 'table' or 'json'", other)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message shown instead of an empty table
const EMPTY_NOTICE: &str = "No usage recorded yet.";

/// Render a list of rows. An empty table renders as a notice; empty
/// JSON stays `[]` so scripts can rely on the shape.
pub fn print_output<T>(rows: &[T], format: OutputFormat) -> anyhow::Result<()>
where
    T: Serialize + Tabled,
{
    match format {
        OutputFormat::Table if rows.is_empty() => println!("{}", EMPTY_NOTICE),
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
    }
    Ok(())
}

/// Render a single row.
pub fn print_single<T>(row: &T, format: OutputFormat) -> anyhow::Result<()>
where
    T: Serialize + Tabled,
{
    match format {
        OutputFormat::Table => println!("{}", Table::new([row])),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(row)?),
    }
    Ok(())
}

/// Error line, red, to stderr.
pub fn print_error(message: &str) {
    eprintln!("{}", message.red());
}

/// Progress line; suppressed by `--quiet`.
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_is_case_insensitive() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_format_display_round_trips() {
        for format in [OutputFormat::Table, OutputFormat::Json] {
            assert_eq!(format.to_string().parse::<OutputFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_default_format_is_table() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }
}
