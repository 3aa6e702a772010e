//! Shared types for the keytree workspace.
//!
//! Holds the error taxonomy every layer reports through, the opaque
//! identifiers used for groups and entries, and the secret wrappers that keep
//! passwords out of logs and memory dumps.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{EntryId, GroupId, SensitiveBytes, SensitiveString};
