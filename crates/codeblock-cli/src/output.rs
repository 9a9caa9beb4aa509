//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use codeblock_core::{is_equivalent, Block};

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

/// Whether the recorded content of a block already matches its solution
fn block_solved(block: &Block) -> bool {
    block
        .solution
        .as_deref()
        .is_some_and(|solution| is_equivalent(block.current_content(), solution))
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print the lobby
    pub fn print_blocks(&self, blocks: &[Block]) {
        match self.format {
            OutputFormat::Human => {
                if blocks.is_empty() {
                    println!("No blocks found.");
                    return;
                }
                for block in blocks {
                    let marker = if block_solved(block) {
                        " [solved]"
                    } else if block.is_modified() {
                        " [in progress]"
                    } else {
                        ""
                    };
                    println!("{:<8} | {}{}", block.id, block.title, marker);
                }
                println!("\n{} block(s)", blocks.len());
            }
            OutputFormat::Json => {
                let json: Vec<_> = blocks
                    .iter()
                    .map(|b| {
                        serde_json::json!({
                            "id": b.id,
                            "title": b.title,
                            "modified": b.is_modified(),
                            "solved": block_solved(b),
                            "updated_at": b.updated_at,
                        })
                    })
                    .collect();
                println!("{}", serde_json::Value::Array(json));
            }
            OutputFormat::Quiet => {
                for block in blocks {
                    println!("{}", block.id);
                }
            }
        }
    }

    /// Print a single block with its content
    pub fn print_block(&self, block: &Block) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", block.id);
                println!("Title:    {}", block.title);
                println!("Solved:   {}", if block_solved(block) { "yes" } else { "no" });
                println!("Updated:  {}", block.updated_at.format("%Y-%m-%d %H:%M"));
                println!();
                println!("── Current ──");
                println!("{}", block.current_content().trim_end());
                if block.is_modified() {
                    println!();
                    println!("── Starter ──");
                    println!("{}", block.starter.trim_end());
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "id": block.id,
                        "title": block.title,
                        "starter": block.starter,
                        "content": block.current_content(),
                        "solved": block_solved(block),
                        "updated_at": block.updated_at,
                    })
                );
            }
            OutputFormat::Quiet => {
                println!("{}", block.current_content().trim_end());
            }
        }
    }

    /// Print the verdict of an equivalence check
    pub fn print_verdict(&self, equivalent: bool) {
        match self.format {
            OutputFormat::Human => {
                if equivalent {
                    println!("✓ Equivalent");
                } else {
                    println!("✗ Not equivalent");
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "equivalent": equivalent }));
            }
            OutputFormat::Quiet => println!("{}", equivalent),
        }
    }

    /// Print a live session event
    ///
    /// Human mode prints `text`; JSON mode prints `event` with its `kind`.
    pub fn event(&self, kind: &str, text: &str, mut event: serde_json::Value) {
        match self.format {
            OutputFormat::Human => println!("{}", text),
            OutputFormat::Json => {
                if let Some(map) = event.as_object_mut() {
                    map.insert("event".to_string(), serde_json::json!(kind));
                }
                println!("{}", event);
            }
            OutputFormat::Quiet => {}
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

    /// Print a warning to stderr
    pub fn warning(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", message);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_block_solved() {
        let mut block = Block::new("array", "Array", "a", Some("b;".to_string()));
        assert!(!block_solved(&block));
        block.set_content("b");
        assert!(block_solved(&block));

        let unsolvable = Block::new("x", "X", "", None);
        assert!(!block_solved(&unsolvable));
    }
}
