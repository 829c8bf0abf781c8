//! OS process table access: title lookup, liveness, signals, detaching.
//!
//! Nothing here remembers processes between calls. Every lookup scans the
//! live process list.

use std::ffi::OsStr;
use std::process::Command;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

use warden_core::ProcessTitle;

use crate::error::DaemonError;

/// A live process whose title matched a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerProcess {
    pub pid: u32,
    pub title: String,
    /// Seconds since the Unix epoch.
    pub started_at_unix: u64,
}

/// All live processes titled exactly `title`, ordered by pid.
///
/// A process matches when its `argv[0]` or its process name equals the title.
/// Prefixes and substrings never match. Threads share their process's cmdline
/// and are skipped, as are zombies and the calling process.
pub fn find_by_title(title: &ProcessTitle) -> Vec<WorkerProcess> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
    );

    let own = std::process::id();
    let wanted = OsStr::new(title.as_str());
    let mut found: Vec<WorkerProcess> = system
        .processes()
        .iter()
        .filter(|(pid, process)| {
            pid.as_u32() != own
                && process.thread_kind().is_none()
                && process.status() != ProcessStatus::Zombie
                && (process.cmd().first().map(|arg0| arg0.as_os_str()) == Some(wanted)
                    || process.name() == wanted)
        })
        .map(|(pid, process)| WorkerProcess {
            pid: pid.as_u32(),
            title: title.to_string(),
            started_at_unix: process.start_time(),
        })
        .collect();
    found.sort_by_key(|worker| worker.pid);
    found
}

/// Existence probe (`kill(pid, 0)`). A process we may not signal still
/// counts as alive. Says nothing about what binary the pid belongs to.
pub fn is_alive(pid: u32) -> bool {
    let Some(pid) = to_nix_pid(pid) else {
        return false;
    };
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Like [`is_alive`], but a zombie awaiting its parent's `wait` counts as gone.
pub fn is_running(pid: u32) -> bool {
    let target = sysinfo::Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::new(),
    );
    system
        .process(target)
        .map(|process| process.status() != ProcessStatus::Zombie)
        .unwrap_or(false)
}

/// Deliver `signal` to `pid`. `Ok(false)` when the process is already gone.
pub fn send_signal(pid: u32, signal: Signal) -> Result<bool, DaemonError> {
    let Some(nix_pid) = to_nix_pid(pid) else {
        return Ok(false);
    };
    match kill(nix_pid, signal) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(DaemonError::Signal { pid, source }),
    }
}

/// Start the child in a new session so it survives the launcher and never
/// receives signals aimed at the launcher's terminal or process group.
pub fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid() is async-signal-safe and touches no parent state.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }
}

// Pid 0 and negative pids address process groups; never hand them to kill().
fn to_nix_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|raw| *raw > 0).map(Pid::from_raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[test]
    fn own_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn pid_zero_and_out_of_range_are_never_alive() {
        assert!(!is_alive(0));
        assert!(!is_alive(u32::MAX));
    }

    #[test]
    fn unknown_title_finds_nothing() {
        let title = ProcessTitle(format!("warden-test-none-{}", std::process::id()));
        assert!(find_by_title(&title).is_empty());
    }

    #[test]
    fn signalling_invalid_pids_is_a_no_op() {
        assert!(!send_signal(0, Signal::SIGTERM).expect("pid 0"));
        assert!(!send_signal(u32::MAX, Signal::SIGTERM).expect("out of range"));
    }

    #[test]
    fn title_lookup_matches_argv0_exactly() {
        use std::os::unix::process::CommandExt;

        let title = format!("warden-test-argv0-{}", std::process::id());
        let mut child = Command::new("sleep")
            .arg0(&title)
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .expect("spawn sleep");

        let exact = find_by_title(&ProcessTitle(title.clone()));
        let prefix = find_by_title(&ProcessTitle(title[..title.len() - 1].to_string()));

        child.kill().expect("kill");
        child.wait().expect("wait");

        assert_eq!(exact.len(), 1, "got: {exact:?}");
        assert_eq!(exact[0].pid, child.id());
        assert!(prefix.is_empty(), "prefix must not match: {prefix:?}");
    }
}
