//! Error taxonomy for keytree operations.

use thiserror::Error;

/// Top-level error type for keytree operations.
///
/// Every variant except a settings parse failure reaches the caller; the
/// settings codec recovers that one locally by reporting "no settings".
#[derive(Debug, Error)]
pub enum Error {
    /// The path cannot address an entry (fewer than two segments).
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A group segment of the path has no matching child group.
    #[error("Group '{segment}' in path '{path}' not found")]
    GroupNotFound { segment: String, path: String },

    /// No entry with the requested title (and matchers) exists in the group.
    #[error("Entry '{title}' in path '{path}' not found")]
    EntryNotFound { title: String, path: String },

    /// An entry with the same title already exists in the target group.
    #[error("Entry '{title}' already exists at '{path}'")]
    DuplicateEntry { title: String, path: String },

    /// The container could not be opened: bad credentials or corrupt data.
    #[error("Unable to decode container: {0}")]
    Decode(String),

    /// The tree could not be serialized into a container.
    #[error("Unable to encode container: {0}")]
    Encode(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store has no tree to serve (never loaded, or the load failed).
    #[error("Store not loaded: {0}")]
    NotLoaded(String),
}

impl Error {
    /// Build an `InvalidPath` error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
