//! Start, stop and restart one detached worker per script.
//!
//! The supervisor keeps no handles. A worker is identified only by its
//! process title (`<prefix><name>`, carried as `argv[0]`), so every stop
//! or status query goes back to the OS process table.

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;

use warden_core::{Config, ProcessTitle, ScriptName};

use crate::error::DaemonError;
use crate::process::{self, WorkerProcess};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn title(&self, name: &ScriptName) -> ProcessTitle {
        self.config.title_for(name)
    }

    /// Live workers for `name`, fresh from the process table.
    pub fn workers(&self, name: &ScriptName) -> Vec<WorkerProcess> {
        process::find_by_title(&self.title(name))
    }

    pub fn is_running(&self, name: &ScriptName) -> bool {
        !self.workers(name).is_empty()
    }

    /// Launch `script` as a detached worker titled for `name` and return its
    /// pid. The worker gets null stdio and its own session. A reaper thread
    /// collects its exit status so it never lingers as a zombie.
    pub fn start(&self, name: &ScriptName, script: &Path) -> Result<u32, DaemonError> {
        let title = self.title(name);
        let mut command = self.command_for(script);
        command
            .arg0(title.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        process::detach(&mut command);

        let mut child = command.spawn().map_err(|source| DaemonError::LaunchFailure {
            title: title.to_string(),
            script: script.to_path_buf(),
            source,
        })?;
        let pid = child.id();
        tracing::info!(title = %title, pid, script = %script.display(), "worker started");

        let reaped_title = title.clone();
        let reaper = std::thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || match child.wait() {
                Ok(status) => {
                    tracing::debug!(title = %reaped_title, pid, %status, "worker exited");
                }
                Err(err) => {
                    tracing::warn!(title = %reaped_title, pid, error = %err, "worker wait failed");
                }
            });
        if let Err(err) = reaper {
            tracing::warn!(title = %title, pid, error = %err, "could not spawn reaper thread");
        }

        Ok(pid)
    }

    /// Stop every worker titled exactly for `name`; returns how many were
    /// signalled. No matching worker is not an error.
    ///
    /// Workers get SIGTERM, then SIGKILL if they outlive the configured grace
    /// period, and this call returns once they are gone.
    pub fn stop(&self, name: &ScriptName) -> Result<usize, DaemonError> {
        let title = self.title(name);
        let workers = process::find_by_title(&title);
        if workers.is_empty() {
            tracing::debug!(title = %title, "no worker to stop");
            return Ok(0);
        }

        let mut signalled = Vec::with_capacity(workers.len());
        for worker in &workers {
            if process::send_signal(worker.pid, Signal::SIGTERM)? {
                signalled.push(worker.pid);
            }
        }

        let survivors = wait_for_exit(signalled, self.config.stop_grace());
        for pid in &survivors {
            tracing::warn!(title = %title, pid, "worker ignored SIGTERM; sending SIGKILL");
            process::send_signal(*pid, Signal::SIGKILL)?;
        }
        let stuck = wait_for_exit(survivors, KILL_WAIT);
        if !stuck.is_empty() {
            tracing::warn!(title = %title, pids = ?stuck, "workers still present after SIGKILL");
        }

        tracing::info!(title = %title, count = workers.len(), "worker stopped");
        Ok(workers.len())
    }

    /// `stop` then `start`. The script has no worker in between.
    pub fn restart(&self, name: &ScriptName, script: &Path) -> Result<u32, DaemonError> {
        self.stop(name)?;
        self.start(name, script)
    }

    fn command_for(&self, script: &Path) -> Command {
        match self.config.interpreter.split_first() {
            Some((program, args)) => {
                let mut command = Command::new(program);
                command.args(args).arg(script);
                command
            }
            None => Command::new(script),
        }
    }
}

// Poll until every pid has exited or `timeout` passes; returns the stragglers.
fn wait_for_exit(mut pids: Vec<u32>, timeout: Duration) -> Vec<u32> {
    let deadline = Instant::now() + timeout;
    pids.retain(|pid| process::is_running(*pid));
    while !pids.is_empty() && Instant::now() < deadline {
        sleep(EXIT_POLL_INTERVAL);
        pids.retain(|pid| process::is_running(*pid));
    }
    pids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn shell_config(tag: &str) -> Config {
        Config {
            title_prefix: format!("warden-sup-{tag}-{}--", std::process::id()),
            extension: "sh".to_string(),
            interpreter: vec!["sh".to_string()],
            stop_grace_ms: 1_000,
        }
    }

    fn write_script(dir: &TempDir, file: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(file);
        fs::write(&path, body).expect("write script");
        path
    }

    fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            sleep(Duration::from_millis(50));
        }
        check()
    }

    const LOOP: &str = "while :; do sleep 1; done\n";

    #[test]
    fn start_then_stop_leaves_no_worker() {
        let dir = TempDir::new().expect("tempdir");
        let script = write_script(&dir, "loop.sh", LOOP);
        let supervisor = Supervisor::new(shell_config("startstop"));
        let name = ScriptName::from("loop");

        let pid = supervisor.start(&name, &script).expect("start");
        assert!(
            wait_until(Duration::from_secs(5), || supervisor.workers(&name).len() == 1),
            "exactly one worker after start"
        );
        assert_eq!(supervisor.workers(&name)[0].pid, pid);

        assert_eq!(supervisor.stop(&name).expect("stop"), 1);
        assert!(supervisor.workers(&name).is_empty());
    }

    #[test]
    fn stop_without_worker_is_a_no_op() {
        let supervisor = Supervisor::new(shell_config("noop"));
        assert_eq!(supervisor.stop(&ScriptName::from("ghost")).expect("stop"), 0);
    }

    #[test]
    fn restart_replaces_worker_with_new_pid() {
        let dir = TempDir::new().expect("tempdir");
        let script = write_script(&dir, "loop.sh", LOOP);
        let supervisor = Supervisor::new(shell_config("restart"));
        let name = ScriptName::from("loop");

        let first = supervisor.start(&name, &script).expect("start");
        let second = supervisor.restart(&name, &script).expect("restart");

        let workers = supervisor.workers(&name);
        supervisor.stop(&name).expect("cleanup");

        assert_ne!(first, second);
        assert_eq!(workers.len(), 1, "got: {workers:?}");
        assert_eq!(workers[0].pid, second);
    }

    #[test]
    fn term_ignoring_worker_is_killed_after_grace() {
        let dir = TempDir::new().expect("tempdir");
        let script = write_script(&dir, "stubborn.sh", "trap '' TERM\nwhile :; do sleep 1; done\n");
        let mut config = shell_config("stubborn");
        config.stop_grace_ms = 200;
        let supervisor = Supervisor::new(config);
        let name = ScriptName::from("stubborn");

        supervisor.start(&name, &script).expect("start");
        assert!(wait_until(Duration::from_secs(5), || supervisor.is_running(&name)));

        supervisor.stop(&name).expect("stop");
        assert!(!supervisor.is_running(&name));
    }

    #[test]
    fn stop_leaves_prefix_sharing_workers_alone() {
        let dir = TempDir::new().expect("tempdir");
        let script = write_script(&dir, "loop.sh", LOOP);
        let supervisor = Supervisor::new(shell_config("exact"));
        let short = ScriptName::from("foo");
        let long = ScriptName::from("foobar");

        supervisor.start(&short, &script).expect("start foo");
        supervisor.start(&long, &script).expect("start foobar");
        assert!(wait_until(Duration::from_secs(5), || {
            supervisor.is_running(&short) && supervisor.is_running(&long)
        }));

        supervisor.stop(&short).expect("stop foo");
        let long_alive = supervisor.is_running(&long);
        supervisor.stop(&long).expect("cleanup");

        assert!(long_alive, "stopping foo must not touch foobar");
    }

    #[test]
    fn missing_interpreter_is_a_launch_failure() {
        let dir = TempDir::new().expect("tempdir");
        let script = write_script(&dir, "loop.sh", LOOP);
        let mut config = shell_config("missing");
        config.interpreter = vec!["/nonexistent/warden-interpreter".to_string()];
        let supervisor = Supervisor::new(config);

        let err = supervisor
            .start(&ScriptName::from("loop"), &script)
            .unwrap_err();
        assert!(matches!(err, DaemonError::LaunchFailure { .. }), "got: {err}");
    }

    #[cfg(target_os = "linux")]
    const THREADED_WORKER: &str = "supervisor::tests::threaded_worker_main";

    // Worker body for `multi_threaded_worker_counts_once`, which re-executes
    // this test binary filtered to this test. Returns at once unless handed
    // the `.threaded` marker script.
    #[test]
    #[ignore]
    fn threaded_worker_main() {
        if !std::env::args().any(|arg| arg.ends_with(".threaded")) {
            return;
        }
        let _threads: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| loop {
                sleep(Duration::from_secs(1));
            }))
            .collect();
        loop {
            sleep(Duration::from_secs(1));
        }
    }

    #[cfg(target_os = "linux")]
    fn task_count(pid: u32) -> usize {
        fs::read_dir(format!("/proc/{pid}/task"))
            .map(|tasks| tasks.count())
            .unwrap_or(0)
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn multi_threaded_worker_counts_once() {
        let dir = TempDir::new().expect("tempdir");
        let script = write_script(&dir, "worker.threaded", "");
        let exe = std::env::current_exe().expect("test binary");
        let mut config = shell_config("threads");
        config.interpreter = vec![
            exe.to_string_lossy().into_owned(),
            "--ignored".to_string(),
            "--exact".to_string(),
            THREADED_WORKER.to_string(),
        ];
        let supervisor = Supervisor::new(config);
        let name = ScriptName::from("threaded");

        let pid = supervisor.start(&name, &script).expect("start");
        let threaded = wait_until(Duration::from_secs(10), || task_count(pid) >= 5);
        let workers: Vec<u32> = supervisor.workers(&name).iter().map(|w| w.pid).collect();
        let stopped = supervisor.stop(&name).expect("stop");

        assert!(threaded, "worker never started its threads");
        assert_eq!(workers, vec![pid]);
        assert_eq!(stopped, 1);
        assert!(!supervisor.is_running(&name));
    }
}
