pub mod list;
pub mod script;
pub mod start;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use warden_core::{registry, Config};

/// Resolve the home directory and make sure the store exists before any
/// command runs.
pub fn prepare_home() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    registry::ensure_store_at(&home).context("failed to create script store")?;
    Ok(home)
}

pub fn load_config(home: &Path) -> Result<Config> {
    Config::load_at(&registry::store_dir_at(home)).context("failed to load warden config")
}
