//! Common types used throughout keytree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use zeroize::Zeroize;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Hex encoding (32 lowercase digits, no dashes).
            pub fn to_hex(&self) -> String {
                self.0.simple().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.simple())
            }
        }

        impl FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> crate::Result<Self> {
                Uuid::try_parse(s).map(Self).map_err(|e| {
                    crate::Error::Config(format!("invalid {} '{}': {}", $label, s, e))
                })
            }
        }
    };
}

opaque_id!(
    /// Store-wide unique identifier of a group.
    GroupId,
    "group id"
);

opaque_id!(
    /// Store-wide unique identifier of an entry.
    EntryId,
    "entry id"
);

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

/// Text secret (passwords) that zeroizes on drop and never prints.
#[derive(Clone, Default, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveString(String);

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveString([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_id_hex_encoding() {
        let id = EntryId::from_uuid(Uuid::from_bytes([0xab; 16]));
        assert_eq!(id.to_hex(), "abababababababababababababababab");
        assert_eq!(id.to_string(), id.to_hex());
    }

    #[test]
    fn test_id_parse_rejects_garbage() {
        assert!("not-an-id".parse::<GroupId>().is_err());
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(GroupId::generate(), GroupId::generate());
    }

    #[test]
    fn test_id_serde_roundtrip() {
        let id = GroupId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let restored: GroupId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn test_sensitive_debug_redacted() {
        let secret = SensitiveString::from("hunter2");
        assert_eq!(format!("{:?}", secret), "SensitiveString([REDACTED])");
        assert_eq!(secret.expose(), "hunter2");

        let bytes = SensitiveBytes::new(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", bytes), "SensitiveBytes([REDACTED; 3 bytes])");
    }

    proptest! {
        #[test]
        fn prop_id_display_parses_back(raw in any::<[u8; 16]>()) {
            let id = EntryId::from_uuid(Uuid::from_bytes(raw));
            let parsed: EntryId = id.to_string().parse().unwrap();
            prop_assert_eq!(parsed, id);
        }
    }
}
