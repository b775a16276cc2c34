//! Content identifiers for encrypted values.
//!
//! A [`Handle`] is produced once per value of an encrypted input bundle. Besides the digest
//! bytes it carries a few plain metadata bytes that contracts read directly: the value index,
//! the host chain id, the type tag and the ciphertext format version.
//!
//! Applications see handles as `0x`-prefixed hex strings, the relayer exchanges them without the
//! prefix. Parsing accepts both.
use alloy_primitives::{hex, B256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Standard length for handles in bytes
pub const HANDLE_LENGTH: usize = 32;

/// Position of the value index within the bundle.
pub const HANDLE_INDEX_BYTE: usize = 21;
/// Big-endian u64 chain id occupies bytes 22 to 29.
pub const HANDLE_CHAIN_ID_START: usize = 22;
pub const HANDLE_CHAIN_ID_END: usize = 30;
pub const HANDLE_TYPE_TAG_BYTE: usize = 30;
pub const HANDLE_VERSION_BYTE: usize = 31;

/// Error types for identifier operations
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    #[error("Invalid handle length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid hex format in handle: {0}")]
    InvalidHexFormat(#[from] hex::FromHexError),
}

/// Handle of one encrypted value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle([u8; HANDLE_LENGTH]);

impl Handle {
    /// Wraps raw digest bytes whose metadata bytes are already in place.
    pub fn from_bytes(bytes: [u8; HANDLE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the handle
    pub fn as_bytes(&self) -> &[u8; HANDLE_LENGTH] {
        &self.0
    }

    /// Consumes the handle and returns the inner byte array
    pub fn into_bytes(self) -> [u8; HANDLE_LENGTH] {
        self.0
    }

    /// Index of the value inside the bundle it was created from.
    pub fn index(&self) -> u8 {
        self.0[HANDLE_INDEX_BYTE]
    }

    /// Chain id of the host chain the input was created for.
    pub fn chain_id(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[HANDLE_CHAIN_ID_START..HANDLE_CHAIN_ID_END]);
        u64::from_be_bytes(buf)
    }

    pub fn type_tag(&self) -> u8 {
        self.0[HANDLE_TYPE_TAG_BYTE]
    }

    pub fn version(&self) -> u8 {
        self.0[HANDLE_VERSION_BYTE]
    }

    /// Application-facing representation, `0x`-prefixed.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Relayer representation, no prefix.
    pub fn to_relayer_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Handle {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);

        let bytes = match hex::decode(s) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("Input {} is not a valid hex string: {}", s, e);
                return Err(IdentifierError::InvalidHexFormat(e));
            }
        };
        Self::try_from(bytes.as_slice())
    }
}

impl AsRef<[u8]> for Handle {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Handle {
    type Error = IdentifierError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != HANDLE_LENGTH {
            return Err(IdentifierError::InvalidLength {
                expected: HANDLE_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut array = [0u8; HANDLE_LENGTH];
        array.copy_from_slice(bytes);
        Ok(Self(array))
    }
}

impl TryFrom<&str> for Handle {
    type Error = IdentifierError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::from_str(s)
    }
}

impl From<B256> for Handle {
    fn from(value: B256) -> Self {
        Self(value.0)
    }
}

impl From<Handle> for B256 {
    fn from(value: Handle) -> Self {
        B256::from(value.0)
    }
}

impl Serialize for Handle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Handle::from_str(&s).map_err(serde::de::Error::custom)
    }
}
