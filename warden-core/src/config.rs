//! Supervisor settings, read from `<store>/config.yaml`.
//!
//! Every field is optional in the file; missing fields take the defaults
//! below, and a missing file means all defaults.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, RegistryError};
use crate::types::{ProcessTitle, ScriptName};

pub const CONFIG_FILE: &str = "config.yaml";

pub const DEFAULT_TITLE_PREFIX: &str = "nodemon--";
pub const DEFAULT_EXTENSION: &str = "js";
pub const DEFAULT_STOP_GRACE_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prepended to a script name to form its worker's process title.
    pub title_prefix: String,
    /// Required script extension, without the leading dot.
    pub extension: String,
    /// Program (and leading arguments) a script is handed to. The script
    /// path is appended. Empty runs the script directly.
    pub interpreter: Vec<String>,
    /// How long a worker gets between SIGTERM and SIGKILL.
    pub stop_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title_prefix: DEFAULT_TITLE_PREFIX.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            interpreter: vec!["node".to_string()],
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
        }
    }
}

impl Config {
    /// Load `<store>/config.yaml`, falling back to defaults when absent.
    pub fn load_at(store: &Path) -> Result<Self, RegistryError> {
        let path = config_path_at(store);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(io_err(&path, err)),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| RegistryError::Config { path, source })
    }

    pub fn title_for(&self, name: &ScriptName) -> ProcessTitle {
        ProcessTitle::new(&self.title_prefix, name)
    }

    /// True when `path` ends in `.<extension>`.
    pub fn is_script(&self, path: &Path) -> bool {
        path.extension() == Some(OsStr::new(&self.extension))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// `<store>/config.yaml`. Pure, no I/O.
pub fn config_path_at(store: &Path) -> PathBuf {
    store.join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let store = TempDir::new().expect("store");
        let config = Config::load_at(store.path()).expect("load");
        assert_eq!(config, Config::default());
        assert_eq!(config.title_prefix, "nodemon--");
        assert_eq!(config.interpreter, vec!["node".to_string()]);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let store = TempDir::new().expect("store");
        std::fs::write(
            config_path_at(store.path()),
            "extension: sh\ninterpreter: [sh]\n",
        )
        .expect("write config");

        let config = Config::load_at(store.path()).expect("load");
        assert_eq!(config.extension, "sh");
        assert_eq!(config.interpreter, vec!["sh".to_string()]);
        assert_eq!(config.title_prefix, DEFAULT_TITLE_PREFIX);
        assert_eq!(config.stop_grace(), Duration::from_millis(DEFAULT_STOP_GRACE_MS));
    }

    #[test]
    fn malformed_file_reports_path() {
        let store = TempDir::new().expect("store");
        std::fs::write(config_path_at(store.path()), "stop_grace_ms: [not, a, number]\n")
            .expect("write config");

        let err = Config::load_at(store.path()).unwrap_err();
        assert!(matches!(err, RegistryError::Config { .. }), "got: {err}");
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn extension_match_is_exact() {
        let config = Config::default();
        assert!(config.is_script(Path::new("/tmp/foo.js")));
        assert!(!config.is_script(Path::new("/tmp/foo.json")));
        assert!(!config.is_script(Path::new("/tmp/foo.txt")));
        assert!(!config.is_script(Path::new("/tmp/.pid")));
        assert!(!config.is_script(Path::new("/tmp/js")));
    }
}
