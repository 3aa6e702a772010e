//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use keytree_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of key derivation salts in bytes.
pub const SALT_LENGTH: usize = 32;

type Blake2b256 = Blake2b<U32>;

/// Pre-KDF key material combining every credential component.
///
/// Each component is hashed on its own and the digests are hashed together,
/// so the container key depends on both the password and the key file
/// without either being stored.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CompositeKey {
    key: [u8; KEY_LENGTH],
}

impl CompositeKey {
    /// Build a composite key.
    ///
    /// # Errors
    /// - Returns error if `password` is empty
    pub fn new(password: &[u8], key_file: Option<&[u8]>) -> Result<Self> {
        if password.is_empty() {
            return Err(Error::Config("Password cannot be empty".to_string()));
        }

        let mut outer = Blake2b256::new();
        outer.update(Blake2b256::digest(password));
        if let Some(contents) = key_file {
            outer.update(Blake2b256::digest(contents));
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&outer.finalize());
        Ok(Self { key })
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositeKey([REDACTED])")
    }
}

/// Container key derived from the composite key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Salt for key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt(pub [u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}
