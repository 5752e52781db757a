//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use docstore_core::{Link, Outcome, VacuumReport, Version};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print one version with its content
    pub fn print_version(&self, row: &Version) {
        match self.format {
            OutputFormat::Human => {
                println!("Path:     {}", row.path);
                println!("Version:  {}", row.version);
                println!("Key:      {}", row.key);
                println!("Author:   {}", row.author);
                if !row.message.is_empty() {
                    println!("Message:  {}", row.message);
                }
                println!("Created:  {}", row.created_at.format("%Y-%m-%d %H:%M"));
                if let Some(deleted_at) = row.deleted_at {
                    println!("Deleted:  {}", deleted_at.format("%Y-%m-%d %H:%M"));
                }
                println!();
                println!("{}", row.content);
            }
            OutputFormat::Json => print_json(row),
            OutputFormat::Quiet => {
                print!("{}", row.content);
            }
        }
    }

    /// Print the versions of one document, oldest first
    pub fn print_history(&self, rows: &[Version]) {
        match self.format {
            OutputFormat::Human => {
                if rows.is_empty() {
                    println!("No versions found.");
                    return;
                }
                for row in rows {
                    println!(
                        "v{:<4} {} | {} | {} | {}{}",
                        row.version,
                        row.key,
                        row.created_at.format("%Y-%m-%d %H:%M"),
                        truncate(&row.author, 16),
                        truncate_line(&row.message, 40),
                        deleted_marker(row)
                    );
                }
                println!("\n{} version(s)", rows.len());
            }
            OutputFormat::Json => print_json(&rows),
            OutputFormat::Quiet => {
                for row in rows {
                    println!("{}", row.key);
                }
            }
        }
    }

    /// Print the latest version of each document
    pub fn print_documents(&self, rows: &[Version]) {
        match self.format {
            OutputFormat::Human => {
                if rows.is_empty() {
                    println!("No documents found.");
                    return;
                }
                for row in rows {
                    println!(
                        "{} | v{} | {} | {}{}",
                        row.key,
                        row.version,
                        row.created_at.format("%Y-%m-%d %H:%M"),
                        truncate(&row.path, 50),
                        deleted_marker(row)
                    );
                }
                println!("\n{} document(s)", rows.len());
            }
            OutputFormat::Json => print_json(&rows),
            OutputFormat::Quiet => {
                for row in rows {
                    println!("{}", row.path);
                }
            }
        }
    }

    /// Print the result of a mutation
    pub fn print_outcome(&self, verb: &str, outcome: &Outcome) {
        match self.format {
            OutputFormat::Human => {
                let mut line = format!(
                    "✓ {} {} v{} ({})",
                    verb, outcome.path, outcome.version, outcome.key
                );
                if let Some(ref from) = outcome.previous_path {
                    line.push_str(&format!(" from {}", from));
                } else if let Some(previous) = outcome.previous_version {
                    line.push_str(&format!(", previously v{}", previous));
                }
                println!("{}", line);
            }
            OutputFormat::Json => print_json(outcome),
            OutputFormat::Quiet => {
                println!("{}", outcome.key);
            }
        }
    }

    /// Print the results of a bulk mutation
    pub fn print_outcomes(&self, verb: &str, outcomes: &[Outcome]) {
        match self.format {
            OutputFormat::Human => {
                for outcome in outcomes {
                    println!("✓ {} {} v{}", verb, outcome.path, outcome.version);
                }
                println!("\n{} document(s)", outcomes.len());
            }
            OutputFormat::Json => print_json(&outcomes),
            OutputFormat::Quiet => {
                for outcome in outcomes {
                    println!("{}", outcome.path);
                }
            }
        }
    }

    /// Print links as seen from `path`
    pub fn print_links(&self, path: &str, links: &[Link]) {
        match self.format {
            OutputFormat::Human => {
                if links.is_empty() {
                    println!("No links found.");
                    return;
                }
                for link in links {
                    let arrow = if link.from_path == path { "->" } else { "<-" };
                    let other = link.other_end(path).unwrap_or(&link.to_path);
                    let tag = link
                        .tag
                        .as_deref()
                        .map(|t| format!(" [{}]", t))
                        .unwrap_or_default();
                    let removed = if link.is_active() { "" } else { " (removed)" };
                    println!("{} {} {}{}{}", link.id, arrow, other, tag, removed);
                }
                println!("\n{} link(s)", links.len());
            }
            OutputFormat::Json => print_json(&links),
            OutputFormat::Quiet => {
                for link in links {
                    println!("{}", link.id);
                }
            }
        }
    }

    /// Print a plain list of paths
    pub fn print_paths(&self, paths: &[String], empty: &str) {
        match self.format {
            OutputFormat::Human => {
                if paths.is_empty() {
                    println!("{}", empty);
                    return;
                }
                for path in paths {
                    println!("{}", path);
                }
                println!("\n{} path(s)", paths.len());
            }
            OutputFormat::Json => print_json(&paths),
            OutputFormat::Quiet => {
                for path in paths {
                    println!("{}", path);
                }
            }
        }
    }

    /// Print a vacuum report
    pub fn print_vacuum_report(&self, report: &VacuumReport) {
        match self.format {
            OutputFormat::Human => {
                let verb = if report.dry_run {
                    "Would remove"
                } else {
                    "Removed"
                };
                println!(
                    "{} {} version row(s) across {} path(s)",
                    verb,
                    report.deleted_count,
                    report.affected_paths.len()
                );
                for (name, count) in &report.dependents {
                    if *count > 0 {
                        println!("  {}: {} row(s)", name, count);
                    }
                }
                for path in &report.affected_paths {
                    println!("  {}", path);
                }
                if report.cancelled {
                    println!("Stopped early; run again to continue.");
                }
            }
            OutputFormat::Json => print_json(report),
            OutputFormat::Quiet => {
                println!("{}", report.total_removed());
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

fn deleted_marker(row: &Version) -> &'static str {
    if row.is_deleted() {
        " [deleted]"
    } else {
        ""
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
