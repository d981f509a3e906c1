//! Command listing and usage display for gi_run

use colored::*;
use pbx_gi_tokio::Registry;

/// Prints the command registry
pub struct CommandPrinter<'a> {
    registry: &'a Registry,
    no_color: bool,
}

impl<'a> CommandPrinter<'a> {
    pub fn new(registry: &'a Registry, no_color: bool) -> Self {
        Self { registry, no_color }
    }

    /// One line per registered command, sorted by name
    pub fn show_commands(&self) {
        let mut commands = self
            .registry
            .commands();
        commands.sort_by_key(|descriptor| descriptor.name());

        if !self.no_color {
            println!("{}", "GI Commands:".cyan().bold());
        } else {
            println!("GI Commands:");
        }

        let width = commands
            .iter()
            .map(|descriptor| {
                descriptor
                    .name()
                    .len()
            })
            .max()
            .unwrap_or(0);

        for descriptor in &commands {
            let name = format!("{:<width$}", descriptor.name(), width = width);
            if !self.no_color {
                println!("  {}  {}", name.bold(), descriptor.summary_text());
            } else {
                println!("  {}  {}", name, descriptor.summary_text());
            }
        }
    }

    /// Usage text of the command named by `words`, e.g. `"stream file"`
    pub fn show_usage(&self, words: &str) {
        let words: Vec<&str> = words
            .split_whitespace()
            .collect();
        match self
            .registry
            .usage(&words)
        {
            Some(usage) => {
                if !self.no_color {
                    println!("{}", usage.cyan());
                } else {
                    println!("{}", usage);
                }
            }
            None => {
                if !self.no_color {
                    eprintln!("{}: no such command '{}'", "Error".red().bold(), words.join(" "));
                } else {
                    eprintln!("Error: no such command '{}'", words.join(" "));
                }
            }
        }
    }
}
