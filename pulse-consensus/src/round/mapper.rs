use std::collections::HashMap;

use pulse_common::{NodeInfo, NodeReference};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ConsensusError, Result};

/// Identifies the candidate list a bitset was computed over. Two nodes
/// with the same candidate set derive the same digest.
pub type MapperDigest = [u8; 32];

/// Deterministic bijection between a round's candidates and dense bit
/// indexes, by ascending reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSetMapper {
    refs: Vec<NodeReference>,
    index: HashMap<NodeReference, usize>,
}

impl BitSetMapper {
    pub fn new(refs: impl IntoIterator<Item = NodeReference>) -> Self {
        let mut refs: Vec<NodeReference> = refs.into_iter().collect();
        refs.sort();
        refs.dedup();
        let index = refs.iter().enumerate().map(|(i, r)| (*r, i)).collect();
        Self { refs, index }
    }

    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a NodeInfo>) -> Self {
        Self::new(nodes.into_iter().map(NodeInfo::reference))
    }

    pub fn ref_to_index(&self, reference: &NodeReference) -> Result<usize> {
        self.index
            .get(reference)
            .copied()
            .ok_or(ConsensusError::MapperLookup(*reference))
    }

    pub fn index_to_ref(&self, index: usize) -> Option<NodeReference> {
        self.refs.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn refs(&self) -> &[NodeReference] {
        &self.refs
    }

    pub fn digest(&self) -> MapperDigest {
        let mut hasher = Sha256::new();
        hasher.update((self.refs.len() as u64).to_be_bytes());
        for reference in &self.refs {
            hasher.update(reference.as_bytes());
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }
}

/// Liveness vote of one node: bit `i` attests that the candidate at mapper
/// index `i` is alive and valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitset {
    len: usize,
    words: Vec<u64>,
}

impl Bitset {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            words: vec![0; len.div_ceil(64)],
        }
    }

    /// Out-of-range indexes are ignored.
    pub fn set(&mut self, index: usize) {
        if index < self.len {
            self.words[index / 64] |= 1u64 << (index % 64);
        }
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len
            && self
                .words
                .get(index / 64)
                .map_or(false, |w| w & (1u64 << (index % 64)) != 0)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count_ones(&self) -> usize {
        (0..self.len).filter(|i| self.get(*i)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(b: u8) -> NodeReference {
        let mut bytes = [0u8; 32];
        bytes[0] = b;
        NodeReference::new(bytes)
    }

    #[test]
    fn test_mapper_is_sorted_and_deduplicated() {
        let mapper = BitSetMapper::new([reference(3), reference(1), reference(2), reference(1)]);
        assert_eq!(mapper.len(), 3);
        assert_eq!(mapper.ref_to_index(&reference(1)).unwrap(), 0);
        assert_eq!(mapper.ref_to_index(&reference(3)).unwrap(), 2);
        assert_eq!(mapper.index_to_ref(1), Some(reference(2)));
        assert_eq!(mapper.index_to_ref(3), None);
    }

    #[test]
    fn test_mapper_lookup_failure() {
        let mapper = BitSetMapper::new([reference(1)]);
        let err = mapper.ref_to_index(&reference(9)).unwrap_err();
        assert!(matches!(err, ConsensusError::MapperLookup(r) if r == reference(9)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_digest_is_order_independent() {
        let a = BitSetMapper::new([reference(1), reference(2), reference(3)]);
        let b = BitSetMapper::new([reference(3), reference(1), reference(2)]);
        let c = BitSetMapper::new([reference(1), reference(2)]);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_bitset_spanning_words() {
        let mut bits = Bitset::new(70);
        bits.set(0);
        bits.set(65);
        bits.set(70);
        assert!(bits.get(0));
        assert!(bits.get(65));
        assert!(!bits.get(64));
        assert!(!bits.get(70));
        assert_eq!(bits.count_ones(), 2);
    }
}
