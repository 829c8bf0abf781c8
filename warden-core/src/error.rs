//! Error types for warden-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from registry and configuration operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The script handed to `add` does not exist.
    #[error("missing file {path}")]
    MissingFile { path: PathBuf },

    /// The script does not carry the configured extension.
    #[error("invalid script {path}: expected a .{expected} file")]
    InvalidScript { path: PathBuf, expected: String },

    /// No script name can be derived from the path (no file stem).
    #[error("cannot derive a script name from {path}")]
    InvalidName { path: PathBuf },

    /// Underlying I/O failure, with the path it happened on.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `config.yaml` exists but could not be parsed.
    #[error("failed to parse config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.into(),
        source,
    }
}
