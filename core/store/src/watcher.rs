//! Reload the store when its container changes on disk.
//!
//! The container's parent directory is watched rather than the file itself:
//! flushes replace the file by rename, which would orphan a watch on the
//! old inode. Best effort only; correctness relies on reload-before-mutate.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use keytree_common::{Error, Result};

use crate::controller::StoreController;

/// Running directory watch feeding reloads into a controller.
///
/// Dropping the watcher stops it.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    target: PathBuf,
}

fn watch_error(e: notify::Error) -> Error {
    Error::Io(std::io::Error::other(e))
}

/// Whether `event` touches `target` in a way that may change its content.
fn affects(event: &Event, target: &Path) -> bool {
    !matches!(event.kind, EventKind::Access(_)) && event.paths.iter().any(|p| p == target)
}

impl ChangeWatcher {
    /// Start watching the container of `controller`.
    ///
    /// Must be called from within a tokio runtime. The watcher only holds a
    /// weak reference, so it never keeps the controller alive.
    ///
    /// # Errors
    /// - `Io` if the directory cannot be resolved or watched
    pub fn spawn(controller: &Arc<StoreController>) -> Result<Self> {
        let database = controller.config().database();
        let parent = match database.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = database.file_name().ok_or_else(|| {
            Error::Config(format!("{} does not name a file", database.display()))
        })?;

        let dir = std::fs::canonicalize(parent)?;
        let target = dir.join(file_name);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(watch_error)?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        let task = tokio::spawn(run(Arc::downgrade(controller), rx, target.clone()));

        info!(path = %target.display(), "Watching container for changes");
        Ok(Self {
            _watcher: watcher,
            task,
            target,
        })
    }

    /// The watched container location.
    pub fn target(&self) -> &Path {
        &self.target
    }
}

/// Consume `first` and every event already queued behind it, returning
/// whether any of them touched the container.
fn drain_batch(
    first: notify::Result<Event>,
    events: &mut mpsc::UnboundedReceiver<notify::Result<Event>>,
    target: &Path,
) -> bool {
    let mut changed = false;
    let mut batched = 0usize;
    let mut next = Some(first);

    while let Some(res) = next {
        batched += 1;
        match res {
            Ok(event) if affects(&event, target) => {
                debug!(kind = ?event.kind, "Container changed on disk");
                changed = true;
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Error watching container directory"),
        }
        next = events.try_recv().ok();
    }

    if batched > 1 {
        debug!(events = batched, "Coalesced filesystem events");
    }
    changed
}

async fn run(
    controller: Weak<StoreController>,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    target: PathBuf,
) {
    while let Some(first) = events.recv().await {
        if !drain_batch(first, &mut events, &target) {
            continue;
        }

        let Some(controller) = controller.upgrade() else {
            break;
        };
        if let Err(e) = controller.reload_if_changed().await {
            warn!(error = %e, "Reload after change failed");
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.task.abort();
        debug!(path = %self.target.display(), "Stopped watching container");
    }
}
