//! Warden daemon: lease, process supervisor, registry watcher, runtime.

mod error;
pub mod lease;
pub mod paths;
pub mod process;
mod runtime;
pub mod supervisor;
pub mod watcher;

pub use error::DaemonError;
pub use lease::{DaemonLease, LeaseStatus};
pub use process::WorkerProcess;
pub use runtime::{dispatch, run, run_until, spawn_background, start_blocking, Dispatched};
pub use supervisor::Supervisor;
pub use watcher::{RegistryWatcher, WatchEvent};
