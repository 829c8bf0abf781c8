//! Translate raw filesystem notifications on the store into [`WatchEvent`]s.
//!
//! The store directory is watched non-recursively. Each registered link's
//! target directory is watched as well, so editing a script in place shows up
//! as `Changed` for its link. Watches are only ever added.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use warden_core::{registry, Config};

use crate::error::{io_err, DaemonError};

/// A registry change, already filtered down to script symlinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A link appeared (new, or replaced by rename).
    Added(PathBuf),
    /// A link disappeared. The path no longer exists.
    Removed(PathBuf),
    /// A link or the script it points at was modified.
    Changed(PathBuf),
}

impl WatchEvent {
    /// The link path inside the store.
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Added(path) | WatchEvent::Removed(path) | WatchEvent::Changed(path) => {
                path
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Appeared,
    Vanished,
    Modified,
}

pub struct RegistryWatcher {
    store: PathBuf,
    config: Config,
    watcher: RecommendedWatcher,
    raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    pending: VecDeque<WatchEvent>,
    /// Canonical script path → link that points at it.
    targets: HashMap<PathBuf, PathBuf>,
    watched_dirs: HashSet<PathBuf>,
}

impl RegistryWatcher {
    /// Begin watching `store`. Events queue up from this point on.
    pub fn new(store: &Path, config: Config) -> Result<Self, DaemonError> {
        // Canonicalize so notify's paths (real paths, e.g. /private/var/... on
        // macOS) compare equal to ours.
        let store = fs::canonicalize(store).map_err(|e| io_err(store, e))?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = recommended_watcher(move |event| {
            let _ = raw_tx.send(event);
        })?;
        watcher.watch(&store, RecursiveMode::NonRecursive)?;
        tracing::info!(store = %store.display(), "watching script registry");

        let mut watched_dirs = HashSet::new();
        watched_dirs.insert(store.clone());
        Ok(Self {
            store,
            config,
            watcher,
            raw_rx,
            pending: VecDeque::new(),
            targets: HashMap::new(),
            watched_dirs,
        })
    }

    /// One `Added` per script link already in the store, so a fresh daemon
    /// brings every registered script up.
    pub fn initial_events(&mut self) -> Result<Vec<WatchEvent>, DaemonError> {
        let mut links: Vec<PathBuf> = fs::read_dir(&self.store)
            .map_err(|e| io_err(&self.store, e))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_symlink()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| self.config.is_script(path))
            .collect();
        links.sort();

        for link in &links {
            self.track_target(link);
        }
        Ok(links.into_iter().map(WatchEvent::Added).collect())
    }

    /// Next translated event. `None` once the notify backend has shut down.
    ///
    /// Cancel-safe: translated events wait in an internal queue.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.raw_rx.recv().await? {
                Ok(event) => {
                    let translated = self.translate(&event);
                    self.pending.extend(translated);
                }
                Err(err) => tracing::warn!(error = %err, "watcher event error"),
            }
        }
    }

    /// Map one raw notification onto zero or more registry events, updating
    /// target watches as links come and go.
    pub fn translate(&mut self, event: &Event) -> Vec<WatchEvent> {
        let mut translated = Vec::new();
        for path in &event.paths {
            let Some(change) = classify(&event.kind, path) else {
                continue;
            };

            if path.parent() == Some(self.store.as_path()) {
                if let Some(event) = self.link_event(path, change) {
                    translated.push(event);
                }
            } else if let Some(link) = self.targets.get(path) {
                if change != Change::Vanished {
                    translated.push(WatchEvent::Changed(link.clone()));
                }
            }
        }
        translated
    }

    fn link_event(&mut self, path: &Path, change: Change) -> Option<WatchEvent> {
        if !self.config.is_script(path) {
            tracing::debug!(path = %path.display(), "ignoring non-script entry");
            return None;
        }

        match change {
            Change::Vanished => {
                self.targets.retain(|_, link| link != path);
                Some(WatchEvent::Removed(path.to_path_buf()))
            }
            Change::Appeared | Change::Modified => {
                let is_link = path
                    .symlink_metadata()
                    .map(|meta| meta.file_type().is_symlink())
                    .unwrap_or(false);
                if !is_link {
                    tracing::debug!(path = %path.display(), "ignoring non-symlink entry");
                    return None;
                }
                self.track_target(path);
                Some(match change {
                    Change::Appeared => WatchEvent::Added(path.to_path_buf()),
                    _ => WatchEvent::Changed(path.to_path_buf()),
                })
            }
        }
    }

    // Remember where `link` points and watch that file's directory.
    fn track_target(&mut self, link: &Path) {
        self.targets.retain(|_, known| known != link);

        let target = match registry::read_entry(link)
            .map_err(DaemonError::from)
            .and_then(|entry| {
                fs::canonicalize(&entry.target_path).map_err(|e| io_err(&entry.target_path, e))
            }) {
            Ok(target) => target,
            Err(err) => {
                tracing::debug!(link = %link.display(), error = %err, "link target unavailable");
                return;
            }
        };

        if let Some(dir) = target.parent() {
            if !self.watched_dirs.contains(dir) {
                match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
                    Ok(()) => {
                        tracing::debug!(path = %dir.display(), "watching script directory");
                        self.watched_dirs.insert(dir.to_path_buf());
                    }
                    Err(err) => {
                        tracing::warn!(path = %dir.display(), error = %err, "cannot watch script directory");
                    }
                }
            }
        }
        self.targets.insert(target, link.to_path_buf());
    }
}

fn classify(kind: &EventKind, path: &Path) -> Option<Change> {
    match kind {
        EventKind::Create(_) => Some(Change::Appeared),
        EventKind::Remove(_) => Some(Change::Vanished),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Change::Vanished),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Change::Appeared),
        // Already reported through the From/To halves.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => None,
        // Backends that cannot tell the two halves apart (FSEvents).
        EventKind::Modify(ModifyKind::Name(_)) => Some(if path.symlink_metadata().is_ok() {
            Change::Appeared
        } else {
            Change::Vanished
        }),
        EventKind::Modify(_) => Some(Change::Modified),
        _ => None,
    }
}
