use std::fmt;

use pulse_common::{NodeInfo, PulseNumber};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest of an agreed active set for one epoch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CloudHash([u8; 32]);

impl CloudHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hashes `epoch` followed by every node in ascending reference order.
    /// The input order of `nodes` does not matter.
    pub fn compute<'a>(epoch: PulseNumber, nodes: impl IntoIterator<Item = &'a NodeInfo>) -> Self {
        let mut sorted: Vec<&NodeInfo> = nodes.into_iter().collect();
        sorted.sort_by_key(|n| n.reference());

        let mut hasher = Sha256::new();
        hasher.update(epoch.0.to_be_bytes());
        hasher.update((sorted.len() as u64).to_be_bytes());
        for node in sorted {
            hasher.update(node.reference().as_bytes());
            hasher.update(node.short_id().0.to_be_bytes());
            hasher.update(node.role().to_string().as_bytes());
            hasher.update(node.public_key());
        }

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CloudHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for CloudHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CloudHash({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_common::StaticRole;

    fn node(seed: u8) -> NodeInfo {
        NodeInfo::from_public_key(vec![seed; 32], StaticRole::Virtual, format!("127.0.0.1:{}", 9000 + seed as u16), "0.1.0")
    }

    #[test]
    fn test_hash_ignores_input_order() {
        let a = node(1);
        let b = node(2);
        let c = node(3);
        let forward = CloudHash::compute(PulseNumber(100), [&a, &b, &c]);
        let backward = CloudHash::compute(PulseNumber(100), [&c, &b, &a]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_hash_depends_on_epoch_and_members() {
        let a = node(1);
        let b = node(2);
        let base = CloudHash::compute(PulseNumber(100), [&a, &b]);
        assert_ne!(base, CloudHash::compute(PulseNumber(110), [&a, &b]));
        assert_ne!(base, CloudHash::compute(PulseNumber(100), [&a]));
    }
}
