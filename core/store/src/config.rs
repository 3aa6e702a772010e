//! Store configuration.

use std::path::{Path, PathBuf};

use keytree_common::{Error, Result, SensitiveString};
use keytree_crypto::KdfParams;

/// Environment variable naming the container location.
pub const ENV_DATABASE: &str = "KEEPASS_DATABASE";

/// Environment variable holding the container password.
pub const ENV_PASSWORD: &str = "KEEPASS_PASSWORD";

/// Environment variable naming an optional key file.
pub const ENV_KEY_FILE: &str = "KEEPASS_KEY_FILE";

/// Whether reads re-load the container first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Serve reads from the tree in memory.
    #[default]
    Cached,
    /// Reload from disk before every read.
    Reload,
}

/// Everything a store needs to open its container.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    database: PathBuf,
    password: SensitiveString,
    key_file: Option<PathBuf>,
    read_policy: ReadPolicy,
    kdf: KdfParams,
    watch: bool,
}

impl StoreConfig {
    /// Create a configuration for the container at `database`.
    ///
    /// # Errors
    /// - `Config` if the location or password is empty
    pub fn new(database: impl Into<PathBuf>, password: impl Into<SensitiveString>) -> Result<Self> {
        let database = database.into();
        let password = password.into();

        if database.as_os_str().is_empty() || password.is_empty() {
            return Err(Error::Config("database or password is not set".to_string()));
        }

        Ok(Self {
            database,
            password,
            key_file: None,
            read_policy: ReadPolicy::default(),
            kdf: KdfParams::default(),
            watch: false,
        })
    }

    /// Read the configuration from `KEEPASS_DATABASE`, `KEEPASS_PASSWORD` and
    /// the optional `KEEPASS_KEY_FILE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`StoreConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = lookup(ENV_DATABASE).unwrap_or_default();
        let password = lookup(ENV_PASSWORD).unwrap_or_default();
        let config = Self::new(database, password)?;

        match lookup(ENV_KEY_FILE).filter(|k| !k.is_empty()) {
            Some(key_file) => Ok(config.with_key_file(key_file)),
            None => Ok(config),
        }
    }

    /// Use a key file as a second factor.
    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    /// KDF cost used when writing the container.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Start a change watcher on the container's directory when the store
    /// is opened.
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    pub fn password(&self) -> &SensitiveString {
        &self.password
    }

    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    pub fn read_policy(&self) -> ReadPolicy {
        self.read_policy
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn watch(&self) -> bool {
        self.watch
    }
}
