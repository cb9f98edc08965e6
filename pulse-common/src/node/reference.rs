use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CommonError, Result};

pub const REFERENCE_LENGTH: usize = 32;

/// Opaque, immutable node identifier.
///
/// Ordering is byte-lexicographic, which is what every deterministic
/// structure of a round (snapshots, bitset mappers, cloud hashes) sorts by.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NodeReference([u8; REFERENCE_LENGTH]);

impl NodeReference {
    pub const fn new(bytes: [u8; REFERENCE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derives a reference from a node's public key (SHA-256 of the key).
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        let mut bytes = [0u8; REFERENCE_LENGTH];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; REFERENCE_LENGTH] = bytes.try_into().map_err(|_| {
            CommonError::InvalidReference(format!(
                "expected {} bytes, got {}",
                REFERENCE_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; REFERENCE_LENGTH] {
        &self.0
    }
}

impl fmt::Display for NodeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for NodeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeReference({})", self)
    }
}

impl FromStr for NodeReference {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CommonError::InvalidReference(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

/// Compact per-epoch alias of a `NodeReference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ShortNodeId(pub u32);

impl ShortNodeId {
    /// Default short id of a node: the first four bytes of SHA-256(reference).
    pub fn from_reference(reference: &NodeReference) -> Self {
        let digest = Sha256::digest(reference.as_bytes());
        Self(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
    }

    /// Next candidate id when resolving a collision.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for ShortNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
