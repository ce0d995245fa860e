//! Output formatting for CLI commands

use chrono::{TimeZone, Utc};
use colored::Colorize;
use mnemo::{MemoryRecord, MemoryResult};
use serde::Serialize;
use std::fmt::Display;

/// Supported output formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text, one record per line
    Plain,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "plain" => Ok(OutputFormat::Plain),
            _ => Err(format!(
                "Unknown output format '{}'. Valid options: table, json, plain",
                s
            )),
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Plain => write!(f, "plain"),
        }
    }
}

fn format_ns(ns: u64) -> String {
    let secs = (ns / 1_000_000_000) as i64;
    let nanos = (ns % 1_000_000_000) as u32;
    match Utc.timestamp_opt(secs, nanos).single() {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ns.to_string(),
    }
}

fn truncate_text(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let mut out: String = single_line.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Output formatter for consistent CLI output
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Table => println!("{} {}", "✓".green(), message),
            OutputFormat::Plain => println!("{}", message),
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({"status": "error", "message": message})
                );
            }
            _ => eprintln!("{} {}", "✗".red(), message),
        }
    }

    /// Print data as JSON
    pub fn json<T: Serialize>(&self, data: &T) {
        match serde_json::to_string_pretty(data) {
            Ok(json) => println!("{}", json),
            Err(e) => self.error(&format!("Failed to serialize to JSON: {}", e)),
        }
    }

    /// Print a simple key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::json!({ key: value })),
            OutputFormat::Table => println!("{}: {}", key.cyan(), value),
            OutputFormat::Plain => println!("{}: {}", key, value),
        }
    }

    /// Print a section title
    pub fn section(&self, title: &str) {
        match self.format {
            OutputFormat::Table => {
                println!();
                println!("{}", title.bold().underline());
                println!();
            }
            OutputFormat::Plain => println!("{}", title),
            OutputFormat::Json => {}
        }
    }

    fn table_header(&self, columns: &[&str]) {
        let header: Vec<_> = columns.iter().map(|c| c.bold().to_string()).collect();
        println!("{}", header.join("  "));
        println!("{}", "-".repeat(columns.iter().map(|c| c.len() + 2).sum::<usize>() + 40));
    }

    /// Print staged or committed records
    pub fn records(&self, title: &str, records: &[MemoryRecord]) {
        match self.format {
            OutputFormat::Json => self.json(&records),
            OutputFormat::Plain => {
                for r in records {
                    println!("{}\t{:.4}\t{}", r.id, r.strength, r.text);
                }
            }
            OutputFormat::Table => {
                self.section(&format!("{} ({})", title, records.len()));
                if records.is_empty() {
                    println!("  {}", "(none)".dimmed());
                    return;
                }
                self.table_header(&["ID", "STRENGTH", "UPDATED", "TEXT"]);
                for r in records {
                    println!(
                        "{:<4}  {:<10.4}  {:<19}  {}",
                        r.id.to_string().yellow(),
                        r.strength,
                        format_ns(r.updated_ns),
                        truncate_text(&r.text, 60)
                    );
                }
            }
        }
    }

    /// Print ranked query results
    pub fn results(&self, query: &str, results: &[MemoryResult]) {
        match self.format {
            OutputFormat::Json => self.json(&results),
            OutputFormat::Plain => {
                for r in results {
                    println!("{}\t{:.4}\t{}", r.record.id, r.score, r.record.text);
                }
            }
            OutputFormat::Table => {
                self.section(&format!("Results for '{}' ({})", query, results.len()));
                if results.is_empty() {
                    println!("  {}", "(no matches)".dimmed());
                    return;
                }
                self.table_header(&["RANK", "ID", "SCORE", "STRENGTH", "TEXT"]);
                for (rank, r) in results.iter().enumerate() {
                    println!(
                        "{:<4}  {:<4}  {:<7.4}  {:<8.4}  {}",
                        rank + 1,
                        r.record.id.to_string().yellow(),
                        r.score,
                        r.record.strength,
                        truncate_text(&r.record.text, 60)
                    );
                }
            }
        }
    }
}
