//! Container encoding: the encrypted on-disk form of a [`Tree`].
//!
//! The store only talks to containers through [`ContainerCodec`]. The codec
//! shipped here seals a JSON rendering of the tree with XChaCha20-Poly1305
//! under an Argon2id key derived from the credentials, and wraps it in a JSON
//! envelope carrying everything needed to derive the key again.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use keytree_common::{Error, Result, SensitiveBytes, SensitiveString};
use keytree_crypto::{decrypt, derive_key, encrypt, CompositeKey, KdfParams, Salt};

use crate::config::StoreConfig;
use crate::tree::Tree;

/// Secrets needed to open a container.
#[derive(Clone)]
pub struct Credentials {
    password: SensitiveString,
    key_file: Option<SensitiveBytes>,
}

impl Credentials {
    /// Password-only credentials.
    ///
    /// # Errors
    /// - `Config` if the password is empty
    pub fn new(password: impl Into<SensitiveString>) -> Result<Self> {
        let password = password.into();
        if password.is_empty() {
            return Err(Error::Config("password is not set".to_string()));
        }
        Ok(Self {
            password,
            key_file: None,
        })
    }

    /// Add the contents of a key file as a second factor.
    pub fn with_key_file(mut self, contents: Vec<u8>) -> Self {
        self.key_file = Some(SensitiveBytes::new(contents));
        self
    }

    /// Build credentials from a store configuration, reading the key file
    /// if one is configured.
    ///
    /// # Errors
    /// - `Config` if the password is empty
    /// - `Io` if the key file cannot be read
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        let credentials = Self::new(config.password().clone())?;
        match config.key_file() {
            Some(path) => {
                let contents = tokio::fs::read(path).await?;
                Ok(credentials.with_key_file(contents))
            }
            None => Ok(credentials),
        }
    }

    fn composite_key(&self) -> Result<CompositeKey> {
        CompositeKey::new(
            self.password.expose().as_bytes(),
            self.key_file.as_ref().map(|k| k.as_bytes()),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password)
            .field("key_file", &self.key_file.is_some())
            .finish()
    }
}

/// Turns container bytes into a tree and back.
pub trait ContainerCodec: Send + Sync {
    /// # Errors
    /// - `Decode` for bad credentials or corrupt data
    fn decode(&self, bytes: &[u8], credentials: &Credentials) -> Result<Tree>;

    /// # Errors
    /// - `Encode` if the tree cannot be serialized or sealed
    fn encode(&self, tree: &Tree, credentials: &Credentials) -> Result<Vec<u8>>;
}

/// Container format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerVersion {
    pub major: u32,
    pub minor: u32,
}

impl ContainerVersion {
    /// Current container format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version can be read by this build.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

const FORMAT_TAG: &str = "keytree-container";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: ContainerVersion,
    salt: Salt,
    kdf: KdfParams,
    /// nonce || ciphertext || tag, base64.
    payload: String,
}

/// Sealed JSON container codec.
#[derive(Debug, Clone, Default)]
pub struct SealedJsonCodec {
    kdf: KdfParams,
}

impl SealedJsonCodec {
    /// Codec writing containers with the given KDF cost. Reading always uses
    /// the parameters recorded in the container.
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }
}

impl ContainerCodec for SealedJsonCodec {
    fn decode(&self, bytes: &[u8], credentials: &Credentials) -> Result<Tree> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| Error::Decode(format!("malformed container header: {}", e)))?;

        if envelope.format != FORMAT_TAG {
            return Err(Error::Decode(format!(
                "unknown container format '{}'",
                envelope.format
            )));
        }
        if !envelope.version.is_compatible() {
            return Err(Error::Decode(format!(
                "incompatible container version {}.{}",
                envelope.version.major, envelope.version.minor
            )));
        }

        let sealed = URL_SAFE_NO_PAD
            .decode(&envelope.payload)
            .map_err(|e| Error::Decode(format!("malformed payload: {}", e)))?;

        let composite = credentials.composite_key()?;
        let key = derive_key(&composite, &envelope.salt, &envelope.kdf)
            .map_err(|e| Error::Decode(e.to_string()))?;
        let plaintext = decrypt(&key, &sealed).map_err(|_| {
            Error::Decode("wrong credentials or corrupted container".to_string())
        })?;
        let plaintext = SensitiveBytes::new(plaintext);

        let tree: Tree = serde_json::from_slice(plaintext.as_bytes())
            .map_err(|e| Error::Decode(format!("malformed tree: {}", e)))?;

        debug!(entries = tree.count_entries(), "Container decoded");
        Ok(tree)
    }

    fn encode(&self, tree: &Tree, credentials: &Credentials) -> Result<Vec<u8>> {
        let plaintext = SensitiveBytes::new(
            serde_json::to_vec(tree).map_err(|e| Error::Encode(e.to_string()))?,
        );

        let salt = Salt::generate();
        let composite = credentials.composite_key()?;
        let key =
            derive_key(&composite, &salt, &self.kdf).map_err(|e| Error::Encode(e.to_string()))?;
        let sealed =
            encrypt(&key, plaintext.as_bytes()).map_err(|e| Error::Encode(e.to_string()))?;

        let envelope = Envelope {
            format: FORMAT_TAG.to_string(),
            version: ContainerVersion::CURRENT,
            salt,
            kdf: self.kdf.clone(),
            payload: URL_SAFE_NO_PAD.encode(sealed),
        };

        serde_json::to_vec_pretty(&envelope).map_err(|e| Error::Encode(e.to_string()))
    }
}
