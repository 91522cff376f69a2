//! Output formatting for obdscan (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use obdscan::FaultCode;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Whether human-oriented messages and progress should be shown
    pub fn interactive(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Table
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print a section heading in table mode
    pub fn heading(&self, title: &str) {
        if self.interactive() {
            println!("\n{}", title.bold());
        }
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("None");
                    }
                } else {
                    let table = Table::new(data).to_string();
                    println!("{}", table);
                }
            }
            OutputFormat::Json => self.print_json(&data),
            OutputFormat::Csv => print_csv(data),
        }
    }

    /// Print any serializable value as pretty JSON
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
        );
    }

    /// Print `key: value` lines for a table-mode summary
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        for (key, value) in pairs {
            println!("{}: {}", key.bold(), value);
        }
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T]) {
    for line in csv_lines(data) {
        println!("{}", line);
    }
}

/// Render rows as CSV lines, header first
fn csv_lines<T: Serialize>(data: &[T]) -> Vec<String> {
    let rows: Vec<serde_json::Value> = data
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect();
    let Some(serde_json::Value::Object(first)) = rows.first() else {
        return Vec::new();
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut lines = vec![headers.join(",")];
    for row in &rows {
        if let serde_json::Value::Object(row) = row {
            let values: Vec<String> = headers
                .iter()
                .map(|h| {
                    row.get(h)
                        .map(|v| match v {
                            serde_json::Value::String(s) => escape_csv(s),
                            other => escape_csv(&other.to_string()),
                        })
                        .unwrap_or_default()
                })
                .collect();
            lines.push(values.join(","));
        }
    }
    lines
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Module display for scan command
#[derive(Debug, Tabled, Serialize)]
pub struct ModuleRow {
    #[tabled(rename = "Module")]
    pub module: String,
    #[tabled(rename = "Request")]
    pub request: String,
    #[tabled(rename = "Role")]
    pub role: String,
    #[tabled(rename = "Faults")]
    pub faults: usize,
}

/// Fault display for scan and decode commands
#[derive(Debug, Tabled, Serialize)]
pub struct FaultRow {
    #[tabled(rename = "Code")]
    pub code: String,
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "System")]
    pub system: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

impl From<&FaultCode> for FaultRow {
    fn from(fault: &FaultCode) -> Self {
        Self {
            code: fault.to_string(),
            category: fault.category().to_string(),
            system: fault.system(),
            status: if fault.pending {
                "Pending".to_string()
            } else {
                "Stored".to_string()
            },
        }
    }
}

/// Timing profile display for profiles command
#[derive(Debug, Tabled, Serialize)]
pub struct ProfileRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Probe gap (ms)")]
    pub inter_probe_delay_ms: u64,
    #[tabled(rename = "Response (ms)")]
    pub module_response_timeout_ms: u64,
    #[tabled(rename = "Faults (ms)")]
    pub dtc_collection_window_ms: u64,
    #[tabled(rename = "Speed window (ms)")]
    pub baud_detect_window_ms: u64,
    #[tabled(rename = "Selected")]
    pub selected: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("P0133"), "P0133");
        assert_eq!(escape_csv("ABS, Chassis"), "\"ABS, Chassis\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_lines() {
        let rows = vec![
            FaultRow {
                code: "P0133".to_string(),
                category: "powertrain".to_string(),
                system: "ECU 0x7E8".to_string(),
                status: "Stored".to_string(),
            },
            FaultRow {
                code: "P0300".to_string(),
                category: "powertrain".to_string(),
                system: "ECU 0x7E8".to_string(),
                status: "Pending".to_string(),
            },
        ];

        let lines = csv_lines(&rows);
        assert_eq!(lines.len(), 3);
        let headers: Vec<&str> = lines[0].split(',').collect();
        let last: Vec<&str> = lines[2].split(',').collect();
        let field = |name: &str| {
            let idx = headers.iter().position(|h| *h == name).unwrap();
            last[idx]
        };
        assert_eq!(field("code"), "P0300");
        assert_eq!(field("status"), "Pending");
        assert_eq!(field("system"), "ECU 0x7E8");
        assert!(csv_lines::<FaultRow>(&[]).is_empty());
    }
}
