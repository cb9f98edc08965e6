use std::collections::{BTreeMap, BTreeSet, HashMap};

use pulse_common::{NodeInfo, NodeReference, ShortNodeId, StaticRole};
use tracing::warn;

/// The active map together with its derived indexes.
///
/// Every mutation rebuilds the indexes before it returns, and the whole
/// value sits behind one lock in the registry, so readers never see an
/// index that disagrees with the map. Short IDs are unique within the set:
/// a node arriving with an ID someone else holds takes the next free one.
#[derive(Debug, Clone)]
pub struct ActiveSet {
    origin: NodeInfo,
    nodes: BTreeMap<NodeReference, NodeInfo>,
    by_role: HashMap<StaticRole, BTreeSet<NodeReference>>,
    by_short_id: HashMap<ShortNodeId, NodeReference>,
    joined_during_previous_pulse: bool,
}

impl ActiveSet {
    pub fn new(origin: NodeInfo) -> Self {
        Self {
            origin,
            nodes: BTreeMap::new(),
            by_role: HashMap::new(),
            by_short_id: HashMap::new(),
            joined_during_previous_pulse: false,
        }
    }

    pub fn origin(&self) -> &NodeInfo {
        &self.origin
    }

    /// Adds or refreshes members and returns them as stored. Current
    /// members keep their short IDs; colliding arrivals are renumbered in
    /// ascending reference order.
    pub fn insert_all(&mut self, nodes: impl IntoIterator<Item = NodeInfo>) -> Vec<NodeInfo> {
        let mut incoming: Vec<NodeInfo> = nodes.into_iter().collect();
        incoming.sort_by_key(|n| n.reference());
        incoming.dedup_by_key(|n| n.reference());

        let mut holders = self.by_short_id.clone();
        let mut stored = Vec::with_capacity(incoming.len());
        for node in incoming {
            let reference = node.reference();
            if let Some(previous) = self.nodes.get(&reference) {
                if holders.get(&previous.short_id()) == Some(&reference) {
                    holders.remove(&previous.short_id());
                }
            }

            let mut short_id = node.short_id();
            while holders.get(&short_id).map_or(false, |holder| *holder != reference) {
                short_id = short_id.next();
            }
            let node = if short_id == node.short_id() {
                node
            } else {
                warn!("short id {} of {} is taken; using {}", node.short_id(), reference, short_id);
                node.with_short_id(short_id)
            };

            holders.insert(short_id, reference);
            self.nodes.insert(reference, node.clone());
            stored.push(node);
        }
        self.reindex();
        stored
    }

    pub fn replace(&mut self, nodes: BTreeMap<NodeReference, NodeInfo>, joined: bool) {
        self.nodes = nodes;
        self.joined_during_previous_pulse = joined;
        self.reindex();
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.joined_during_previous_pulse = false;
        self.reindex();
    }

    /// All members, ascending by reference.
    pub fn snapshot(&self) -> Vec<NodeInfo> {
        self.nodes.values().cloned().collect()
    }

    pub fn get(&self, reference: &NodeReference) -> Option<&NodeInfo> {
        self.nodes.get(reference)
    }

    pub fn contains(&self, reference: &NodeReference) -> bool {
        self.nodes.contains_key(reference)
    }

    pub fn by_role(&self, role: StaticRole) -> Vec<NodeReference> {
        self.by_role
            .get(&role)
            .map(|refs| refs.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn by_short_id(&self, short_id: ShortNodeId) -> Option<&NodeInfo> {
        self.by_short_id.get(&short_id).and_then(|r| self.nodes.get(r))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn joined_during_previous_pulse(&self) -> bool {
        self.joined_during_previous_pulse
    }

    fn reindex(&mut self) {
        self.by_role.clear();
        self.by_short_id.clear();

        for (reference, node) in self.nodes.iter_mut() {
            let mut short_id = node.short_id();
            while self.by_short_id.contains_key(&short_id) {
                short_id = short_id.next();
            }
            if short_id != node.short_id() {
                warn!("short id {} of {} is taken; using {}", node.short_id(), reference, short_id);
                *node = node.with_short_id(short_id);
            }
            self.by_role.entry(node.role()).or_default().insert(*reference);
            self.by_short_id.insert(short_id, *reference);
        }

        // The origin's own record follows whatever the set was given.
        if let Some(node) = self.nodes.get(&self.origin.reference()) {
            self.origin = node.clone();
        }
    }
}
