//! Host-wide daemon singleton backed by the `.pid` file in the store.
//!
//! The file is held under an exclusive advisory lock (`flock`) for as long as
//! the [`DaemonLease`] lives, so two daemons racing through startup cannot
//! both win. Inside the lock the recorded pid is still probed: a live pid that
//! is not ours also denies the lease. The file is never deleted; a stale pid
//! is simply overwritten by the next owner.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;

use crate::error::{io_err, DaemonError};
use crate::process;

/// Ownership of the pid file. Dropping it releases the lock; the recorded
/// pid stays behind and is treated as stale once the process is gone.
#[derive(Debug)]
pub struct DaemonLease {
    path: PathBuf,
    pid: u32,
    // Held only for its lock.
    _file: File,
}

impl DaemonLease {
    /// Take the lease at `path` for the current process.
    ///
    /// Fails with [`DaemonError::LeaseDenied`] when another process holds the
    /// lock or the recorded pid belongs to a live process other than us. A
    /// denied attempt writes nothing.
    pub fn acquire(path: &Path) -> Result<Self, DaemonError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| io_err(path, e))?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(DaemonError::LeaseDenied {
                    pid: read_pid(&mut file),
                    path: path.to_path_buf(),
                });
            }
            return Err(io_err(path, err));
        }

        let own = std::process::id();
        if let Some(recorded) = read_pid(&mut file) {
            if recorded != own && process::is_alive(recorded) {
                tracing::warn!(
                    pid = recorded,
                    path = %path.display(),
                    "recorded daemon pid is alive; refusing lease",
                );
                return Err(DaemonError::LeaseDenied {
                    pid: Some(recorded),
                    path: path.to_path_buf(),
                });
            }
            if recorded != own {
                tracing::info!(stale_pid = recorded, "replacing stale daemon lease");
            }
        }

        file.set_len(0).map_err(|e| io_err(path, e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| io_err(path, e))?;
        file.write_all(own.to_string().as_bytes())
            .map_err(|e| io_err(path, e))?;
        file.sync_all().map_err(|e| io_err(path, e))?;

        tracing::info!(pid = own, path = %path.display(), "daemon lease acquired");
        Ok(Self {
            path: path.to_path_buf(),
            pid: own,
            _file: file,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What the pid file currently says, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseStatus {
    pub pid: Option<u32>,
    pub alive: bool,
}

/// Read the pid file without locking it. A missing file is "no lease".
pub fn inspect(path: &Path) -> Result<LeaseStatus, DaemonError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LeaseStatus {
                pid: None,
                alive: false,
            })
        }
        Err(err) => return Err(io_err(path, err)),
    };
    let pid = parse_pid(&contents);
    Ok(LeaseStatus {
        pid,
        alive: pid.map(process::is_alive).unwrap_or(false),
    })
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    parse_pid(&contents)
}

fn parse_pid(contents: &str) -> Option<u32> {
    contents.trim().parse().ok().filter(|pid| *pid > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    fn lease_path(dir: &TempDir) -> PathBuf {
        dir.path().join(".nodemon").join(".pid")
    }

    #[test]
    fn first_acquire_creates_file_with_own_pid() {
        let dir = TempDir::new().expect("tempdir");
        let path = lease_path(&dir);

        let lease = DaemonLease::acquire(&path).expect("acquire");
        assert_eq!(lease.pid(), std::process::id());
        assert_eq!(
            fs::read_to_string(&path).expect("read").trim(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn second_acquire_is_denied_while_first_is_held() {
        let dir = TempDir::new().expect("tempdir");
        let path = lease_path(&dir);

        let _held = DaemonLease::acquire(&path).expect("acquire");
        let err = DaemonLease::acquire(&path).unwrap_err();
        match err {
            DaemonError::LeaseDenied { pid, .. } => assert_eq!(pid, Some(std::process::id())),
            other => panic!("expected LeaseDenied, got: {other}"),
        }
    }

    #[test]
    fn released_lease_can_be_reacquired() {
        let dir = TempDir::new().expect("tempdir");
        let path = lease_path(&dir);

        drop(DaemonLease::acquire(&path).expect("first"));
        assert!(path.exists(), "pid file is never deleted");
        DaemonLease::acquire(&path).expect("second");
    }

    #[test]
    fn stale_pid_is_overwritten() {
        let dir = TempDir::new().expect("tempdir");
        let path = lease_path(&dir);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "999999999\n").expect("write stale pid");

        let lease = DaemonLease::acquire(&path).expect("acquire over stale pid");
        assert_eq!(
            fs::read_to_string(lease.path()).expect("read").trim(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn garbage_content_is_treated_as_stale() {
        let dir = TempDir::new().expect("tempdir");
        let path = lease_path(&dir);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "not a pid").expect("write garbage");

        DaemonLease::acquire(&path).expect("acquire over garbage");
    }

    #[test]
    fn live_recorded_pid_denies_without_touching_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = lease_path(&dir);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");

        let mut other = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .expect("spawn sleep");
        fs::write(&path, other.id().to_string()).expect("write live pid");

        let result = DaemonLease::acquire(&path);
        let contents = fs::read_to_string(&path).expect("read");

        other.kill().expect("kill");
        other.wait().expect("wait");

        assert!(matches!(result, Err(DaemonError::LeaseDenied { .. })));
        assert_eq!(contents, other.id().to_string());
    }

    #[test]
    fn exactly_one_of_concurrent_acquires_wins() {
        let dir = TempDir::new().expect("tempdir");
        let path = Arc::new(lease_path(&dir));
        let contenders = 8;
        let barrier = Arc::new(Barrier::new(contenders));

        let handles: Vec<_> = (0..contenders)
            .map(|_| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    DaemonLease::acquire(&path)
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect();
        let winners = results.iter().filter(|result| result.is_ok()).count();
        let denied = results
            .iter()
            .filter(|result| matches!(result, Err(DaemonError::LeaseDenied { .. })))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(denied, contenders - 1);
    }

    #[test]
    fn inspect_reports_missing_and_live_leases() {
        let dir = TempDir::new().expect("tempdir");
        let path = lease_path(&dir);

        let missing = inspect(&path).expect("inspect missing");
        assert_eq!(missing, LeaseStatus { pid: None, alive: false });

        let _lease = DaemonLease::acquire(&path).expect("acquire");
        let held = inspect(&path).expect("inspect held");
        assert_eq!(held.pid, Some(std::process::id()));
        assert!(held.alive);
    }
}
