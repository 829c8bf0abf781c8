//! `warden add <file>` and `warden remove <file>`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use warden_core::{registry, ScriptName};
use warden_daemon::Supervisor;

use super::load_config;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Script to register.
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Registered script (or just its basename) whose worker should stop.
    pub file: PathBuf,
}

impl AddArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let config = load_config(home)?;
        let entry = registry::add_at(home, &config, &self.file)
            .with_context(|| format!("failed to add '{}'", self.file.display()))?;

        println!(
            "{}",
            format!("\n  Adding script: {}\n", entry.link_path.display())
                .white()
                .bold()
        );
        Ok(())
    }
}

impl RemoveArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let config = load_config(home)?;
        let name = ScriptName::from_path(&self.file)
            .with_context(|| format!("invalid script name '{}'", self.file.display()))?;
        let supervisor = Supervisor::new(config);
        let title = supervisor.title(&name);

        let stopped = supervisor
            .stop(&name)
            .with_context(|| format!("failed to stop '{title}'"))?;
        if stopped == 0 {
            println!("no running worker titled {title}");
        } else {
            println!("✓ Stopped {stopped} worker(s) titled {title}");
        }
        Ok(())
    }
}
