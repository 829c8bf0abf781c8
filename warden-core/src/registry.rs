//! Symlink-backed script registry.
//!
//! # Storage layout
//!
//! ```text
//! ~/.nodemon/
//!   <name>.js -> /absolute/path/to/<name>.js   (one symlink per script)
//!   .pid                                       (daemon lease, see warden-daemon)
//!   config.yaml                                (optional)
//! ```
//!
//! The directory is the only state; nothing here caches it.
//!
//! # API pattern
//!
//! Every function takes the home directory explicitly (`fn_at(home: &Path, …)`).
//! The CLI resolves it once; tests pass a `TempDir`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{io_err, RegistryError};
use crate::types::{ScriptEntry, ScriptName};

pub const STORE_DIR: &str = ".nodemon";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.nodemon/`. Pure, no I/O.
pub fn store_dir_at(home: &Path) -> PathBuf {
    home.join(STORE_DIR)
}

/// `<home>/.nodemon/`, created (mode `0700`) if it does not yet exist.
pub fn ensure_store_at(home: &Path) -> Result<PathBuf, RegistryError> {
    let dir = store_dir_at(home);
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

// ---------------------------------------------------------------------------
// 2. Add
// ---------------------------------------------------------------------------

/// Register `script` by linking `<store>/<basename>` to its absolute path.
///
/// The extension is checked before existence, so a wrong-extension path is
/// always `InvalidScript`. On either error the store is left untouched.
/// An existing link of the same name is replaced atomically (temporary
/// sibling link, then `rename`).
pub fn add_at(home: &Path, config: &Config, script: &Path) -> Result<ScriptEntry, RegistryError> {
    if !config.is_script(script) {
        return Err(RegistryError::InvalidScript {
            path: script.to_path_buf(),
            expected: config.extension.clone(),
        });
    }
    if !script.is_file() {
        return Err(RegistryError::MissingFile {
            path: script.to_path_buf(),
        });
    }

    let name = ScriptName::from_path(script)?;
    let file_name = script
        .file_name()
        .ok_or_else(|| RegistryError::InvalidName {
            path: script.to_path_buf(),
        })?
        .to_os_string();
    let target = fs::canonicalize(script).map_err(|e| io_err(script, e))?;

    let store = ensure_store_at(home)?;
    let link_path = store.join(&file_name);
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(&file_name);
    tmp_name.push(".tmp");
    let tmp_path = store.join(tmp_name);

    match fs::remove_file(&tmp_path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(&tmp_path, err)),
    }
    create_symlink(&target, &tmp_path)?;
    fs::rename(&tmp_path, &link_path).map_err(|e| io_err(&link_path, e))?;

    tracing::debug!(
        link = %link_path.display(),
        target = %target.display(),
        "registered script",
    );

    Ok(ScriptEntry {
        name,
        link_path,
        target_path: target,
    })
}

// ---------------------------------------------------------------------------
// 3. List
// ---------------------------------------------------------------------------

/// Every symlink in the store with its resolved target, sorted by name.
///
/// A missing or empty store yields an empty list, never an error. Entries
/// that are not symlinks (the pid file, `config.yaml`) are skipped, and so
/// are hidden links such as the temporary one `add_at` renames into place.
pub fn list_at(home: &Path) -> Result<Vec<ScriptEntry>, RegistryError> {
    let store = store_dir_at(home);
    let entries = match fs::read_dir(&store) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(&store, err)),
    };

    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(&store, e))?;
        let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
        if !ty.is_symlink() || entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        scripts.push(read_entry(&entry.path())?);
    }
    scripts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(scripts)
}

/// Read one registry link. Relative link targets resolve against the
/// link's own directory.
pub fn read_entry(link_path: &Path) -> Result<ScriptEntry, RegistryError> {
    let name = ScriptName::from_path(link_path)?;
    let raw = fs::read_link(link_path).map_err(|e| io_err(link_path, e))?;
    let target_path = match link_path.parent() {
        Some(dir) if raw.is_relative() => dir.join(raw),
        _ => raw,
    };
    Ok(ScriptEntry {
        name,
        link_path: link_path.to_path_buf(),
        target_path,
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<(), RegistryError> {
    std::os::unix::fs::symlink(target, link).map_err(|e| io_err(link, e))
}
#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> Result<(), RegistryError> {
    std::os::windows::fs::symlink_file(target, link).map_err(|e| io_err(link, e))
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
