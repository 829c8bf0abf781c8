//! `warden start` — run the supervisor daemon.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use warden_daemon::paths::daemon_log_path;
use warden_daemon::{spawn_background, start_blocking, DaemonError};

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Start the daemon in its own session and return immediately.
    #[arg(long, short = 'd')]
    pub detach: bool,
}

impl StartArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        if self.detach {
            let pid = spawn_background(home).context("failed to launch background daemon")?;
            println!(
                "daemon launched (pid {pid}); log: {}",
                daemon_log_path(home).display()
            );
            return Ok(());
        }

        match start_blocking(home) {
            Ok(()) => Ok(()),
            Err(err @ DaemonError::LeaseDenied { .. }) => {
                println!("{err}");
                Ok(())
            }
            Err(err) => Err(err).context("daemon exited with error"),
        }
    }
}
