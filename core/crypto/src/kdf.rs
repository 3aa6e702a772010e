//! Key derivation using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::keys::{CompositeKey, MasterKey, Salt, KEY_LENGTH};
use keytree_common::{Error, Result};

/// Parameters for Argon2id key derivation.
///
/// Stored in each container header so a container can always be reopened
/// with the parameters it was written with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Create parameters suitable for interactive use.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive the container key from a composite key and salt using Argon2id.
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - Returns error if Argon2id parameters are invalid
pub fn derive_key(composite: &CompositeKey, salt: &Salt, params: &KdfParams) -> Result<MasterKey> {
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(composite.as_bytes(), salt.as_bytes(), &mut key_bytes)
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(MasterKey::from_bytes(key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_derive_key_deterministic() {
        let composite = CompositeKey::new(b"test-password-123", None).unwrap();
        let salt = Salt::from_bytes([42u8; 32]);

        let key1 = derive_key(&composite, &salt, &fast()).unwrap();
        let key2 = derive_key(&composite, &salt, &fast()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let composite = CompositeKey::new(b"test-password-123", None).unwrap();

        let key1 = derive_key(&composite, &Salt::from_bytes([1u8; 32]), &fast()).unwrap();
        let key2 = derive_key(&composite, &Salt::from_bytes([2u8; 32]), &fast()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let composite = CompositeKey::new(b"pw", None).unwrap();
        let params = KdfParams {
            memory_cost: 1,
            time_cost: 0,
            parallelism: 1,
        };

        assert!(matches!(
            derive_key(&composite, &Salt::generate(), &params),
            Err(Error::Crypto(_))
        ));
    }
}
