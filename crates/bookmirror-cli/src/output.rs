//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use bookmirror_core::models::{tree_totals, Walk};
use bookmirror_core::{Job, QueueItem, QueueStatus, SearchResult, TreeNode};

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

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print the unified tree
    pub fn print_tree(&self, nodes: &[TreeNode]) {
        match self.format {
            OutputFormat::Human => {
                if nodes.is_empty() {
                    println!("Library is empty.");
                    return;
                }
                for line in render_tree(nodes) {
                    println!("{}", line);
                }
                let (folders, notes) = tree_totals(nodes);
                println!("\n{} folder(s), {} note(s)", folders, notes);
            }
            OutputFormat::Json => print_json(&nodes),
            OutputFormat::Quiet => {
                for (_, node) in Walk::new(nodes) {
                    println!("{}", node.id);
                }
            }
        }
    }

    /// Print a job's status
    pub fn print_job(&self, job: &Job) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:        {}", job.id);
                println!("Type:      {}", job.kind);
                println!("Status:    {}", job.status);
                println!(
                    "Progress:  {}/{} ({:.0}%)",
                    job.completed_items,
                    job.total_items,
                    job.progress() * 100.0
                );
                if let Some(ref message) = job.error_message {
                    println!("Error:     {}", message);
                }
                if let Some(created) = job.created_at {
                    println!("Created:   {}", created.format("%Y-%m-%d %H:%M:%S"));
                }
                if let Some(completed) = job.completed_at {
                    println!("Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
                }
            }
            OutputFormat::Json => print_json(job),
            OutputFormat::Quiet => println!("{}", job.status),
        }
    }

    /// Print the search queue
    pub fn print_queue(&self, items: &[QueueItem]) {
        match self.format {
            OutputFormat::Human => {
                if items.is_empty() {
                    println!("Search queue is empty.");
                    return;
                }
                for item in items {
                    let detail = match item.status {
                        QueueStatus::Completed => item
                            .results
                            .as_ref()
                            .map(|r| format!("{} hit(s)", r.hits.len()))
                            .unwrap_or_default(),
                        QueueStatus::Error => {
                            truncate_line(item.error_message.as_deref().unwrap_or(""), 40)
                        }
                        _ => String::new(),
                    };
                    println!(
                        "{:>4} | {:<10} | {:<16} | {:<35} | {}",
                        item.id,
                        item.status.to_string(),
                        item.kind().to_string(),
                        truncate(item.request.query(), 35),
                        detail
                    );
                }
                println!("\n{} item(s)", items.len());
            }
            OutputFormat::Json => print_json(&items),
            OutputFormat::Quiet => {
                for item in items {
                    println!("{}", item.id);
                }
            }
        }
    }

    /// Print one queue item with its results
    pub fn print_queue_item(&self, item: &QueueItem) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", item.id);
                println!("Kind:    {}", item.kind());
                println!("Query:   {}", item.request.query());
                println!("Pages:   {}", item.request.page_count());
                println!("Status:  {}", item.status);
                println!("Queued:  {}", item.created_at.format("%Y-%m-%d %H:%M"));
                if let Some(ref message) = item.error_message {
                    println!("Error:   {}", message);
                }
                if let Some(ref results) = item.results {
                    println!();
                    self.print_search_hits(results);
                }
            }
            OutputFormat::Json => print_json(item),
            OutputFormat::Quiet => println!("{}", item.status),
        }
    }

    fn print_search_hits(&self, results: &SearchResult) {
        println!(
            "── Results ({} of {}) ──",
            results.hits.len(),
            results.total
        );
        for hit in &results.hits {
            println!("[{:.2}] {} ({})", hit.score, hit.title, hit.id);
            if let Some(ref snippet) = hit.snippet {
                println!("       {}", truncate_line(snippet, 70));
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

    /// Progress line on stderr, human mode only
    pub fn progress(&self, msg: &str) {
        if self.format == OutputFormat::Human {
            eprintln!("{}", msg);
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

/// Indented lines for a forest, folders with their note counts
fn render_tree(nodes: &[TreeNode]) -> Vec<String> {
    Walk::new(nodes)
        .map(|(depth, node)| {
            let indent = "  ".repeat(depth);
            if node.is_folder() {
                format!("{}▸ {} ({})", indent, node.name, node.note_count)
            } else {
                format!("{}• {}", indent, truncate(&node.name, 60))
            }
        })
        .collect()
}

/// Truncate a string to max length, adding "..." if truncated
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
