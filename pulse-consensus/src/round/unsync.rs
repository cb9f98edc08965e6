use std::collections::{BTreeMap, BTreeSet};

use pulse_common::{NodeInfo, NodeReference, ShortNodeId};
use tracing::debug;

use super::mapper::{BitSetMapper, Bitset, MapperDigest};
use crate::claims::Claim;
use crate::policy::QuorumPolicy;

/// Outcome of merging a round proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub active: BTreeMap<NodeReference, NodeInfo>,
    /// The merged set omits the local origin.
    pub should_exit: bool,
    /// The merged set contains a node absent from the base set.
    pub nodes_joined_during_previous_pulse: bool,
}

/// Round proposal: the base active set, the claims observed this round and
/// the liveness votes collected for the resulting candidates.
///
/// Everything is keyed by reference, so the merge does not depend on the
/// order claims and votes arrived in.
#[derive(Debug, Clone)]
pub struct UnsyncList {
    origin: NodeReference,
    policy: QuorumPolicy,
    base: BTreeMap<NodeReference, NodeInfo>,
    joiners: BTreeMap<NodeReference, NodeInfo>,
    leavers: BTreeSet<NodeReference>,
    votes: BTreeMap<NodeReference, Bitset>,
}

impl UnsyncList {
    pub fn new(origin: NodeReference, base: impl IntoIterator<Item = NodeInfo>, policy: QuorumPolicy) -> Self {
        Self {
            origin,
            policy,
            base: base.into_iter().map(|n| (n.reference(), n)).collect(),
            joiners: BTreeMap::new(),
            leavers: BTreeSet::new(),
            votes: BTreeMap::new(),
        }
    }

    pub fn origin(&self) -> NodeReference {
        self.origin
    }

    pub fn base(&self) -> &BTreeMap<NodeReference, NodeInfo> {
        &self.base
    }

    /// Records an already verified claim. Join and announce claims of
    /// non-members add candidates; a leave claim removes a member. Votes
    /// collected so far are dropped when the candidate set changes.
    pub fn add_claim(&mut self, claim: &Claim) {
        let changed = match claim {
            Claim::Join(c) => self.add_joiner(&c.node),
            Claim::Announce(c) => self.add_joiner(&c.join.node),
            Claim::Leave(c) => self.base.contains_key(&c.node) && self.leavers.insert(c.node),
        };
        if changed && !self.votes.is_empty() {
            debug!("candidate set changed after voting started; dropping {} votes", self.votes.len());
            self.votes.clear();
        }
    }

    /// Adds administratively inserted nodes to the base set.
    pub fn extend_base(&mut self, nodes: impl IntoIterator<Item = NodeInfo>) {
        let mut changed = false;
        for node in nodes {
            self.joiners.remove(&node.reference());
            changed |= self.base.insert(node.reference(), node).is_none();
        }
        if changed {
            self.votes.clear();
        }
    }

    fn add_joiner(&mut self, node: &NodeInfo) -> bool {
        let reference = node.reference();
        if self.base.contains_key(&reference) || self.joiners.contains_key(&reference) {
            return false;
        }
        self.joiners.insert(reference, node.clone());
        true
    }

    pub fn is_newcomer(&self, reference: &NodeReference) -> bool {
        self.joiners.contains_key(reference) && !self.leavers.contains(reference)
    }

    pub fn is_leaving(&self, reference: &NodeReference) -> bool {
        self.leavers.contains(reference)
    }

    /// Base set plus claimed joiners minus verified leavers, ascending.
    pub fn candidates(&self) -> Vec<NodeInfo> {
        let mut all: BTreeMap<NodeReference, &NodeInfo> = self.base.iter().map(|(r, n)| (*r, n)).collect();
        for (reference, node) in &self.joiners {
            all.entry(*reference).or_insert(node);
        }
        all.into_iter()
            .filter(|(r, _)| !self.leavers.contains(r))
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn candidate(&self, reference: &NodeReference) -> Option<&NodeInfo> {
        if self.leavers.contains(reference) {
            return None;
        }
        self.base.get(reference).or_else(|| self.joiners.get(reference))
    }

    pub fn contains_candidate(&self, reference: &NodeReference) -> bool {
        self.candidate(reference).is_some()
    }

    pub fn mapper(&self) -> BitSetMapper {
        BitSetMapper::from_nodes(&self.candidates())
    }

    /// Records `voter`'s bitset. Rejected when it was computed over another
    /// candidate list or has the wrong length; a voter's first bitset wins.
    pub fn add_vote(&mut self, voter: NodeReference, digest: &MapperDigest, bitset: Bitset) -> bool {
        let mapper = self.mapper();
        if &mapper.digest() != digest || bitset.len() != mapper.len() {
            debug!("rejecting bitset of {}: computed over a different candidate list", voter);
            return false;
        }
        if self.votes.contains_key(&voter) {
            return false;
        }
        self.votes.insert(voter, bitset);
        true
    }

    pub fn voters(&self) -> usize {
        self.votes.len()
    }

    /// Computes the new active set.
    ///
    /// A candidate is retained when the quorum policy accepts its
    /// affirmative votes among all recorded voters. Retained members keep
    /// their short ids; a retained newcomer whose short id is already taken
    /// gets the next free one, newcomers processed in ascending reference
    /// order.
    pub fn merged(&self) -> MergeResult {
        let mapper = self.mapper();
        let voters = self.votes.len();

        let retained: Vec<NodeReference> = mapper
            .refs()
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let votes = self.votes.values().filter(|b| b.get(*i)).count();
                self.policy.retains(votes, voters)
            })
            .map(|(_, r)| *r)
            .collect();

        let mut active = BTreeMap::new();
        let mut taken: BTreeSet<ShortNodeId> = BTreeSet::new();

        for reference in retained.iter().filter(|r| self.base.contains_key(r)) {
            if let Some(node) = self.base.get(reference) {
                taken.insert(node.short_id());
                active.insert(*reference, node.clone());
            }
        }

        let mut joined = false;
        for reference in retained.iter().filter(|r| !self.base.contains_key(r)) {
            let Some(node) = self.joiners.get(reference) else {
                continue;
            };
            let mut short_id = node.short_id();
            while taken.contains(&short_id) {
                short_id = short_id.next();
            }
            taken.insert(short_id);
            let node = if short_id == node.short_id() {
                node.clone()
            } else {
                debug!("short id collision for {}: {} -> {}", reference, node.short_id(), short_id);
                node.with_short_id(short_id)
            };
            active.insert(*reference, node);
            joined = true;
        }

        MergeResult {
            should_exit: !active.contains_key(&self.origin),
            nodes_joined_during_previous_pulse: joined,
            active,
        }
    }
}
