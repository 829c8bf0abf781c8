//! `warden list` — registered scripts and their targets.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use warden_core::{registry, ScriptEntry};

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ListEntryJson {
    name: String,
    link: String,
    target: String,
}

impl ListArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let entries = registry::list_at(home).context("failed to read script store")?;

        if self.json {
            return print_json(&entries);
        }

        if entries.is_empty() {
            println!("\n  No monitoring scripts found. Add your first one.");
        } else {
            println!("\n  Listing active nodemon scripts...\n");
            for entry in &entries {
                println!("    {}", entry.name.to_string().bold().green());
                println!("    {}", entry.target_path.display());
                println!();
            }
        }
        println!("\n  To see usage run \"warden --help\"\n");
        Ok(())
    }
}

fn print_json(entries: &[ScriptEntry]) -> Result<()> {
    let payload: Vec<ListEntryJson> = entries
        .iter()
        .map(|entry| ListEntryJson {
            name: entry.name.to_string(),
            link: entry.link_path.display().to_string(),
            target: entry.target_path.display().to_string(),
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to render list JSON")?
    );
    Ok(())
}
