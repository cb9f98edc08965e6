use std::collections::HashMap;

use pulse_common::{NodeReference, ShortNodeId};

use crate::error::{ConsensusError, Result};

/// Consensus-only address of a node: its declared `host:port` with the port
/// shifted by `offset`.
pub fn consensus_address(address: &str, offset: u16) -> Result<String> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| ConsensusError::InvalidAddress(format!("{address}: missing port")))?;
    let port: u16 = port
        .parse()
        .map_err(|e| ConsensusError::InvalidAddress(format!("{address}: {e}")))?;
    let shifted = port
        .checked_add(offset)
        .ok_or_else(|| ConsensusError::InvalidAddress(format!("{address}: port overflow")))?;
    Ok(format!("{host}:{shifted}"))
}

/// Per-round consensus addresses, by reference and by short id.
#[derive(Debug, Default)]
pub struct TransientMap {
    by_reference: HashMap<NodeReference, String>,
    by_short_id: HashMap<ShortNodeId, String>,
}

impl TransientMap {
    pub fn insert(&mut self, reference: NodeReference, short_id: ShortNodeId, address: String) {
        self.by_reference.insert(reference, address.clone());
        self.by_short_id.insert(short_id, address);
    }

    pub fn by_reference(&self, reference: &NodeReference) -> Option<&String> {
        self.by_reference.get(reference)
    }

    pub fn by_short_id(&self, short_id: ShortNodeId) -> Option<&String> {
        self.by_short_id.get(&short_id)
    }

    pub fn clear(&mut self) {
        self.by_reference.clear();
        self.by_short_id.clear();
    }

    pub fn len(&self) -> usize {
        self.by_reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }
}
