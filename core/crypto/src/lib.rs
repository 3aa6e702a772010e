//! Cryptographic primitives for keytree containers.
//!
//! This module provides:
//! - Composite keys built from a password and an optional key file
//! - Key derivation using Argon2id
//! - Authenticated encryption using XChaCha20-Poly1305
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged

pub mod aead;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, encrypt, NONCE_SIZE, TAG_SIZE};
pub use kdf::{derive_key, KdfParams};
pub use keys::{CompositeKey, MasterKey, Salt, KEY_LENGTH, SALT_LENGTH};
