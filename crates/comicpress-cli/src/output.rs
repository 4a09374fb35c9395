//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::path::Path;

use comicpress_core::{ExportResult, ExportStatus, Page};

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

    pub fn is_human(&self) -> bool {
        matches!(self.format, OutputFormat::Human)
    }

    /// Print a page with its panels and bubbles
    pub fn print_page(&self, page: &Page) -> serde_json::Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("Page:    {}", page.id);
                println!("Layout:  {}", page.layout);
                println!("Panels:  {}", page.panels.len());
                println!("Bubbles: {}", page.bubble_count());

                for panel in &page.panels {
                    println!();
                    println!(
                        "── Panel {} at ({:.1}, {:.1}) {:.1}x{:.1} ──",
                        short_id(&panel.id),
                        panel.x,
                        panel.y,
                        panel.width,
                        panel.height
                    );
                    if !panel.image_url.is_empty() {
                        println!("Image: {}", truncate(&panel.image_url, 60));
                    }
                    for bubble in &panel.bubbles {
                        println!(
                            "  [{:?}] {}",
                            bubble.kind,
                            truncate_line(&bubble.text, 60)
                        );
                    }
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(page)?);
            }
            OutputFormat::Quiet => {
                println!("{}", page.id);
            }
        }
        Ok(())
    }

    /// Print a finished export
    pub fn print_export(&self, result: &ExportResult, path: &Path) {
        match self.format {
            OutputFormat::Human => {
                println!("✓ Exported {} ({} bytes)", path.display(), result.bytes.len());
                if let Some(ref url) = result.remote_url {
                    println!("  Backend copy: {}", url);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "success",
                        "path": path,
                        "file_name": result.file_name,
                        "format": result.format,
                        "media_type": result.media_type,
                        "bytes": result.bytes.len(),
                        "remote_url": result.remote_url,
                    })
                );
            }
            OutputFormat::Quiet => {
                println!("{}", path.display());
            }
        }
    }

    /// Progress line on stderr, human mode only
    pub fn progress(&self, status: &ExportStatus) {
        if self.is_human() {
            eprintln!("{:?}... {}%", status.state, status.progress);
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
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
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
