//! Domain types for the script registry.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A registered script's name: the link basename without its extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScriptName(pub String);

impl ScriptName {
    /// Derive the name from any path to a script or registry link
    /// (`/code/jobs/backup.js` → `backup`).
    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .map(Self::from)
            .ok_or_else(|| RegistryError::InvalidName {
                path: path.to_path_buf(),
            })
    }
}

impl fmt::Display for ScriptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ScriptName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ScriptName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The display title a worker process carries (`<prefix><name>`).
///
/// Workers are found again by comparing this title for exact equality, so two
/// scripts never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessTitle(pub String);

impl ProcessTitle {
    pub fn new(prefix: &str, name: &ScriptName) -> Self {
        Self(format!("{prefix}{}", name.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One symlink in the store directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub name: ScriptName,
    /// `<store>/<basename>`, the symlink itself.
    pub link_path: PathBuf,
    /// Absolute path the link resolves to.
    pub target_path: PathBuf,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
