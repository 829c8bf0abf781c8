use std::path::{Path, PathBuf};

use warden_core::registry::store_dir_at;

pub const PID_FILE: &str = ".pid";
pub const DAEMON_LOG: &str = ".nodemon.log";

pub fn store_dir(home: &Path) -> PathBuf {
    store_dir_at(home)
}

pub fn pid_file_path(home: &Path) -> PathBuf {
    store_dir(home).join(PID_FILE)
}

/// Output of a `start --detach` daemon. Kept outside the store so log
/// writes never show up as registry events.
pub fn daemon_log_path(home: &Path) -> PathBuf {
    home.join(DAEMON_LOG)
}
