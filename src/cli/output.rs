use crate::jj::Change;
use console::style;
use serde::Serialize;
use std::fmt::Display;

/// Centralized output formatting so every command prints the same way
pub struct Output;

impl Output {
    pub fn success<T: Display>(message: T) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error<T: Display>(message: T) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning<T: Display>(message: T) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info<T: Display>(message: T) {
        println!("{} {}", style("ℹ").cyan(), message);
    }

    /// Print a sub-item with arrow prefix
    pub fn sub_item<T: Display>(message: T) {
        println!("  {} {}", style("→").dim(), message);
    }

    pub fn bullet<T: Display>(message: T) {
        println!("  {} {}", style("•").dim(), message);
    }

    pub fn section<T: Display>(title: T) {
        println!("\n{}", style(title).bold().underlined());
    }

    pub fn tip<T: Display>(message: T) {
        println!("{} {}", style("TIP:").cyan(), style(message).dim());
    }

    pub fn command_example<T: Display>(command: T) {
        println!("  {}", style(command).yellow());
    }

    /// One-line rendering of a change: short id, bookmarks, title
    pub fn change(change: &Change) -> String {
        let mut line = format!("{}", style(change.short_id()).magenta());
        if !change.bookmarks.is_empty() {
            line.push_str(&format!(" {}", style(change.bookmarks.join(", ")).cyan()));
        }
        if change.conflict {
            line.push_str(&format!(" {}", style("(conflict)").red()));
        }
        line.push(' ');
        line.push_str(change.title());
        line
    }

    /// Pretty JSON for `--json` consumers
    pub fn json<T: Serialize>(value: &T) -> crate::errors::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}
