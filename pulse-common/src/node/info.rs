use serde::{Deserialize, Serialize};

use super::{NodeReference, ShortNodeId, StaticRole};

/// Immutable description of a cluster participant.
///
/// Fields are only readable; a changed short id yields a new value through
/// [`NodeInfo::with_short_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    reference: NodeReference,
    short_id: ShortNodeId,
    role: StaticRole,
    #[serde(with = "hex::serde")]
    public_key: Vec<u8>,
    address: String,
    version: String,
}

impl NodeInfo {
    pub fn new(
        reference: NodeReference,
        short_id: ShortNodeId,
        role: StaticRole,
        public_key: Vec<u8>,
        address: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            reference,
            short_id,
            role,
            public_key,
            address: address.into(),
            version: version.into(),
        }
    }

    /// Builds the info of a node whose reference and short id are derived
    /// from its public key.
    pub fn from_public_key(
        public_key: Vec<u8>,
        role: StaticRole,
        address: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let reference = NodeReference::from_public_key(&public_key);
        let short_id = ShortNodeId::from_reference(&reference);
        Self::new(reference, short_id, role, public_key, address, version)
    }

    pub fn reference(&self) -> NodeReference {
        self.reference
    }

    pub fn short_id(&self) -> ShortNodeId {
        self.short_id
    }

    pub fn role(&self) -> StaticRole {
        self.role
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn with_short_id(&self, short_id: ShortNodeId) -> Self {
        Self {
            short_id,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_public_key_derives_identity() {
        let info = NodeInfo::from_public_key(vec![7u8; 32], StaticRole::Virtual, "127.0.0.1:9000", "0.1.0");
        assert_eq!(info.reference(), NodeReference::from_public_key(&[7u8; 32]));
        assert_eq!(info.short_id(), ShortNodeId::from_reference(&info.reference()));
        assert_eq!(info.role(), StaticRole::Virtual);
    }

    #[test]
    fn test_with_short_id_keeps_everything_else() {
        let info = NodeInfo::from_public_key(vec![7u8; 32], StaticRole::HeavyMaterial, "127.0.0.1:9000", "0.1.0");
        let moved = info.with_short_id(ShortNodeId(42));
        assert_eq!(moved.short_id(), ShortNodeId(42));
        assert_eq!(moved.reference(), info.reference());
        assert_eq!(moved.address(), info.address());
    }
}
