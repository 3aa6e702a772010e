//! Store controller: the one owner of the in-memory tree.
//!
//! A single async mutex wraps the tree. Every mutation holds it across the
//! whole reload → mutate → flush sequence, reads hold it while they look at
//! the tree, and watcher-triggered reloads queue on it like everyone else.
//! There is no cross-process locking: two controllers on the same file can
//! still race, the rename only keeps each individual write whole.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::SystemTime;

use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use keytree_common::{Error, Result};

use crate::config::{ReadPolicy, StoreConfig};
use crate::container::{ContainerCodec, Credentials, SealedJsonCodec};
use crate::tree::Tree;
use crate::watcher::ChangeWatcher;

/// Lifecycle state of a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreState {
    /// No load attempted yet.
    Unloaded,
    /// A tree is available.
    Loaded,
    /// Re-reading the container; the previous tree is still held.
    Reloading,
    /// Writing the container.
    Flushing,
    /// The initial load failed; there is no tree to serve.
    Failed(String),
}

/// Owns the tree and serializes every access to it.
pub struct StoreController {
    config: StoreConfig,
    codec: Arc<dyn ContainerCodec>,
    tree: Mutex<Option<Tree>>,
    state: watch::Sender<StoreState>,
    watcher: StdMutex<Option<ChangeWatcher>>,
    /// Modification time of the container at the last load or flush.
    /// Only touched while the tree lock is held.
    synced: StdMutex<Option<SystemTime>>,
}

impl StoreController {
    /// Create an unloaded controller using the sealed JSON codec.
    pub fn new(config: StoreConfig) -> Self {
        let codec = Arc::new(SealedJsonCodec::new(config.kdf().clone()));
        Self::with_codec(config, codec)
    }

    /// Create an unloaded controller using a custom codec.
    pub fn with_codec(config: StoreConfig, codec: Arc<dyn ContainerCodec>) -> Self {
        let (state, _) = watch::channel(StoreState::Unloaded);
        Self {
            config,
            codec,
            tree: Mutex::new(None),
            state,
            watcher: StdMutex::new(None),
            synced: StdMutex::new(None),
        }
    }

    /// Open an existing container.
    ///
    /// Starts the change watcher if the configuration asks for one; a
    /// watcher that fails to start is logged and skipped.
    ///
    /// # Errors
    /// - `Io` if the container or key file cannot be read
    /// - `Decode` for bad credentials or corrupt data
    pub async fn open(config: StoreConfig) -> Result<Arc<Self>> {
        let controller = Arc::new(Self::new(config));
        controller.load().await?;
        controller.start_watcher_if_configured();
        Ok(controller)
    }

    /// Write a new container holding `tree` and return a loaded controller.
    ///
    /// # Errors
    /// - `Io` if the location already exists or cannot be written
    /// - `Encode` if the tree cannot be encoded
    pub async fn create(config: StoreConfig, tree: Tree) -> Result<Arc<Self>> {
        if tokio::fs::try_exists(config.database()).await? {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", config.database().display()),
            )));
        }

        let controller = Arc::new(Self::new(config));
        {
            let mut slot = controller.tree.lock().await;
            controller.flush_tree(&tree).await?;
            *slot = Some(tree);
            controller.set_state(StoreState::Loaded);
        }
        info!(path = %controller.config.database().display(), "Container created");

        controller.start_watcher_if_configured();
        Ok(controller)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StoreState {
        self.state.borrow().clone()
    }

    /// Follow state transitions.
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: StoreState) {
        debug!(state = ?state, "Store state");
        self.state.send_replace(state);
    }

    fn not_loaded(&self) -> Error {
        match self.state() {
            StoreState::Failed(reason) => Error::NotLoaded(reason),
            _ => Error::NotLoaded("container has not been loaded".to_string()),
        }
    }

    fn record_sync(&self, modified: Option<SystemTime>) {
        if let Ok(mut synced) = self.synced.lock() {
            *synced = modified;
        }
    }

    fn last_sync(&self) -> Option<SystemTime> {
        self.synced.lock().ok().and_then(|synced| *synced)
    }

    async fn container_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(self.config.database())
            .await
            .and_then(|m| m.modified())
            .ok()
    }

    /// Decode the container, returning the tree and the modification time
    /// observed before reading.
    async fn read_container(&self) -> Result<(Tree, Option<SystemTime>)> {
        let credentials = Credentials::from_config(&self.config).await?;
        let modified = self.container_modified().await;
        let bytes = tokio::fs::read(self.config.database()).await?;
        let codec = Arc::clone(&self.codec);

        // Decoding runs the KDF; keep it off the executor.
        let tree = tokio::task::spawn_blocking(move || codec.decode(&bytes, &credentials))
            .await
            .map_err(join_error)??;
        Ok((tree, modified))
    }

    /// Load the container, replacing any tree held.
    ///
    /// On failure the controller holds no tree and is `Failed`.
    pub async fn load(&self) -> Result<()> {
        let mut slot = self.tree.lock().await;
        self.load_locked(&mut slot).await
    }

    async fn load_locked(&self, slot: &mut Option<Tree>) -> Result<()> {
        match self.read_container().await {
            Ok((tree, modified)) => {
                self.record_sync(modified);
                info!(
                    path = %self.config.database().display(),
                    entries = tree.count_entries(),
                    "Container loaded"
                );
                *slot = Some(tree);
                self.set_state(StoreState::Loaded);
                Ok(())
            }
            Err(e) => {
                error!(path = %self.config.database().display(), error = %e, "Unable to load container");
                *slot = None;
                self.set_state(StoreState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Re-read the container and replace the tree wholesale.
    ///
    /// On failure the previous tree is kept and the error returned. A
    /// controller that never loaded performs a full load instead.
    pub async fn reload(&self) -> Result<()> {
        let mut slot = self.tree.lock().await;
        self.reload_locked(&mut slot).await
    }

    async fn reload_locked(&self, slot: &mut Option<Tree>) -> Result<()> {
        if slot.is_none() {
            return self.load_locked(slot).await;
        }

        self.set_state(StoreState::Reloading);
        let result = self.read_container().await;
        self.set_state(StoreState::Loaded);

        match result {
            Ok((tree, modified)) => {
                self.record_sync(modified);
                debug!(entries = tree.count_entries(), "Container reloaded");
                *slot = Some(tree);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Reload failed, keeping previous tree");
                Err(e)
            }
        }
    }

    /// Reload unless the container still carries the modification time seen
    /// at the last load or flush. Returns whether a reload ran.
    ///
    /// Used by the change watcher, which also sees this controller's own
    /// flushes.
    pub async fn reload_if_changed(&self) -> Result<bool> {
        let mut slot = self.tree.lock().await;
        let modified = self.container_modified().await;
        if slot.is_some() && modified.is_some() && modified == self.last_sync() {
            debug!("Container unchanged since last sync, skipping reload");
            return Ok(false);
        }

        self.reload_locked(&mut slot).await?;
        Ok(true)
    }

    /// Write the current tree to the container.
    pub async fn flush(&self) -> Result<()> {
        let slot = self.tree.lock().await;
        let tree = slot.as_ref().ok_or_else(|| self.not_loaded())?;
        self.flush_tree(tree).await
    }

    async fn flush_tree(&self, tree: &Tree) -> Result<()> {
        self.set_state(StoreState::Flushing);
        let result = self.write_container(tree).await;
        self.set_state(StoreState::Loaded);

        match result {
            Ok(modified) => {
                self.record_sync(modified);
                debug!(path = %self.config.database().display(), "Container flushed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Flush failed, container left unchanged");
                Err(e)
            }
        }
    }

    async fn write_container(&self, tree: &Tree) -> Result<Option<SystemTime>> {
        let credentials = Credentials::from_config(&self.config).await?;
        let codec = Arc::clone(&self.codec);
        let tree = tree.clone();
        let target = self.config.database().to_path_buf();

        // Encode before touching the filesystem: an encode failure leaves
        // no temporary file behind.
        tokio::task::spawn_blocking(move || -> Result<Option<SystemTime>> {
            let bytes = codec.encode(&tree, &credentials)?;
            persist_atomically(&target, &bytes)?;
            Ok(std::fs::metadata(&target).and_then(|m| m.modified()).ok())
        })
        .await
        .map_err(join_error)?
    }

    /// Run a mutation: reload, apply `f`, flush.
    ///
    /// `f` works on a copy of the freshly reloaded tree; the copy replaces
    /// the held tree only once the container has been written, so a failed
    /// mutation or flush leaves memory and disk as they were.
    pub async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Tree) -> Result<T>,
    {
        let mut slot = self.tree.lock().await;
        debug!("Acquired lock");
        self.reload_locked(&mut slot).await?;

        let mut working = slot.as_ref().ok_or_else(|| self.not_loaded())?.clone();
        let value = f(&mut working)?;
        self.flush_tree(&working).await?;
        *slot = Some(working);

        Ok(value)
    }

    /// Run a read under the configured [`ReadPolicy`].
    pub async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tree) -> Result<T>,
    {
        self.read_with(self.config.read_policy(), f).await
    }

    /// Run a read, reloading first when `policy` says so.
    pub async fn read_with<T, F>(&self, policy: ReadPolicy, f: F) -> Result<T>
    where
        F: FnOnce(&Tree) -> Result<T>,
    {
        let mut slot = self.tree.lock().await;
        if policy == ReadPolicy::Reload {
            self.reload_locked(&mut slot).await?;
        }

        let tree = slot.as_ref().ok_or_else(|| self.not_loaded())?;
        f(tree)
    }

    fn start_watcher_if_configured(self: &Arc<Self>) {
        if !self.config.watch() {
            return;
        }
        match ChangeWatcher::spawn(self) {
            Ok(watcher) => {
                if let Ok(mut slot) = self.watcher.lock() {
                    *slot = Some(watcher);
                }
            }
            Err(e) => warn!(error = %e, "Change watcher not started"),
        }
    }

    /// Stop the change watcher, if one is running.
    pub fn stop_watching(&self) {
        if let Ok(mut slot) = self.watcher.lock() {
            slot.take();
        }
    }

    /// Whether a change watcher is running.
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().map(|w| w.is_some()).unwrap_or(false)
    }
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(e))
}

/// Write `bytes` next to `target` and rename over it.
///
/// A failed rename drops the temporary file, which deletes it.
fn persist_atomically(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::Builder::new()
        .prefix(".keytree-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;

    file.persist(target).map_err(|e| {
        error!(path = %target.display(), error = %e.error, "Unable to move container into place");
        Error::Io(e.error)
    })?;
    Ok(())
}
