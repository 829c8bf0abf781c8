use std::fs::OpenOptions;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use warden_core::{registry, Config, ScriptName};

use crate::error::{io_err, DaemonError};
use crate::lease::DaemonLease;
use crate::paths::{daemon_log_path, pid_file_path};
use crate::process;
use crate::supervisor::Supervisor;
use crate::watcher::{RegistryWatcher, WatchEvent};

/// What one watch event did to the workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Started { name: ScriptName, pid: u32 },
    Restarted { name: ScriptName, pid: u32 },
    Stopped { name: ScriptName, count: usize },
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon until ctrl-c.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    run_until(home, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("received ctrl-c, shutting down daemon"),
            Err(err) => {
                tracing::error!(error = %err, "ctrl-c handler failed; running until killed");
                std::future::pending::<()>().await;
            }
        }
    })
    .await
}

/// Run the daemon until `shutdown` resolves.
///
/// Startup is gated step by step: store directory, then lease, then watcher.
/// A denied lease returns [`DaemonError::LeaseDenied`] before any watch is
/// registered.
pub async fn run_until<F>(home: PathBuf, shutdown: F) -> Result<(), DaemonError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = registry::ensure_store_at(&home)?;
    let lease = DaemonLease::acquire(&pid_file_path(&home))?;
    let config = Config::load_at(&store)?;

    let watcher = RegistryWatcher::new(&store, config.clone())?;
    let supervisor = Arc::new(Supervisor::new(config));

    let (event_tx, event_rx) = mpsc::channel::<WatchEvent>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let result = watcher_task(watcher, event_tx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let dispatcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let result = dispatcher_task(supervisor, event_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown_tx = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => {}
                _ = shutdown => {
                    let _ = shutdown_tx.send(());
                }
            }
            Ok::<(), DaemonError>(())
        })
    };

    let (watcher_result, dispatcher_result, signal_result) =
        tokio::join!(watcher_handle, dispatcher_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("dispatcher", dispatcher_result)?;
    handle_join("signal_handler", signal_result)?;

    tracing::info!(pid = lease.pid(), lease = %lease.path().display(), "daemon stopped");
    Ok(())
}

async fn watcher_task(
    mut watcher: RegistryWatcher,
    event_tx: mpsc::Sender<WatchEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    for event in watcher.initial_events()? {
        if event_tx.send(event).await.is_err() {
            return Ok(());
        }
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = watcher.next() => {
                let Some(event) = event else { break };
                tracing::debug!(event = ?event, "registry event");
                // The dispatcher only drops its receiver on shutdown.
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn dispatcher_task(
    supervisor: Arc<Supervisor>,
    mut event_rx: mpsc::Receiver<WatchEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_event = event_rx.recv() => {
                let Some(event) = maybe_event else { break };
                let supervisor = supervisor.clone();
                let path = event.path().to_path_buf();
                let outcome = tokio::task::spawn_blocking(move || dispatch(&supervisor, &event))
                    .await
                    .map_err(|err| DaemonError::Runtime(format!("dispatch join error: {err}")))?;

                // One failing script never stops supervision of the others.
                match outcome {
                    Ok(done) => tracing::debug!(outcome = ?done, "event dispatched"),
                    Err(err) => tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "event dispatch failed",
                    ),
                }
            }
        }
    }

    Ok(())
}

/// Apply one registry event to the workers.
///
/// `Added` for a script whose worker is already live restarts it, so a
/// replaced link or the startup scan never leaves two workers behind.
pub fn dispatch(supervisor: &Supervisor, event: &WatchEvent) -> Result<Dispatched, DaemonError> {
    match event {
        WatchEvent::Added(link) => {
            let entry = registry::read_entry(link)?;
            if supervisor.is_running(&entry.name) {
                let pid = supervisor.restart(&entry.name, &entry.target_path)?;
                Ok(Dispatched::Restarted {
                    name: entry.name,
                    pid,
                })
            } else {
                let pid = supervisor.start(&entry.name, &entry.target_path)?;
                Ok(Dispatched::Started {
                    name: entry.name,
                    pid,
                })
            }
        }
        WatchEvent::Removed(link) => {
            let name = ScriptName::from_path(link)?;
            let count = supervisor.stop(&name)?;
            Ok(Dispatched::Stopped { name, count })
        }
        WatchEvent::Changed(link) => {
            let entry = registry::read_entry(link)?;
            let pid = supervisor.restart(&entry.name, &entry.target_path)?;
            Ok(Dispatched::Restarted {
                name: entry.name,
                pid,
            })
        }
    }
}

/// Re-launch the current executable as `start` in its own session, output
/// appended to the daemon log. Returns the new daemon's pid without waiting.
pub fn spawn_background(home: &Path) -> Result<u32, DaemonError> {
    let binary = std::env::current_exe().map_err(|e| io_err("current executable", e))?;
    let log_path = daemon_log_path(home);
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| io_err(&log_path, e))?;
    let log_err = log.try_clone().map_err(|e| io_err(&log_path, e))?;

    let mut command = Command::new(&binary);
    command
        .arg("start")
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    process::detach(&mut command);

    let child = command.spawn().map_err(|e| io_err(&binary, e))?;
    Ok(child.id())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
