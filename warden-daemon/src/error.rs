use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the lease, supervisor, watcher and daemon runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("registry error: {0}")]
    Registry(#[from] warden_core::RegistryError),

    /// Another live daemon owns the lease at `path`.
    #[error("daemon already running (lease {path} held by pid {})", display_pid(.pid))]
    LeaseDenied { pid: Option<u32>, path: PathBuf },

    #[error("failed to launch {title} ({script}): {source}")]
    LaunchFailure {
        title: String,
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("daemon runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

fn display_pid(pid: &Option<u32>) -> String {
    pid.map(|pid| pid.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
