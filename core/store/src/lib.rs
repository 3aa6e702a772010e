//! Path-addressed credential store for keytree.
//!
//! This module provides:
//! - The group/entry tree and slash-path resolution with field matchers
//! - Tree mutations: create, update, delete, SSH key attachments
//! - The encrypted container codec and atomic flushing
//! - A controller that serializes reload → mutate → flush under one lock
//! - An optional directory watcher that reloads on external changes
//!
//! # Architecture
//! Callers go through [`EntryOperations`], which borrows a
//! [`StoreController`]. The controller owns the only [`Tree`] and hands it
//! by reference into the resolver and mutator functions.

pub mod config;
pub mod container;
pub mod controller;
pub mod mutator;
pub mod operations;
pub mod resolver;
pub mod settings;
pub mod tree;
pub mod watcher;

pub use config::{ReadPolicy, StoreConfig};
pub use container::{ContainerCodec, ContainerVersion, Credentials, SealedJsonCodec};
pub use controller::{StoreController, StoreState};
pub use mutator::SshKey;
pub use operations::{EntryInput, EntryOperations, EntryRecord};
pub use resolver::{EntryPath, Matcher, Resolved};
pub use settings::SshAgentSettings;
pub use tree::{Attachment, Entry, Field, Group, Tree};
pub use watcher::ChangeWatcher;
