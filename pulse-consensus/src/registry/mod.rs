//! Membership store of the local node: the agreed active set, the per-round
//! consensus addresses, the cloud hash, and the admission state machine.

mod active;
mod state;
mod transient;

pub use active::ActiveSet;
pub use state::NodeKeeperState;
pub use transient::{consensus_address, TransientMap};

use std::sync::Arc;

use pulse_common::auth::Authenticator;
use pulse_common::{DynamicRole, NodeInfo, NodeReference, ShortNodeId, StaticRole};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::claims::{AnnounceClaim, ClaimQueue, JoinClaim, LeaveClaim};
use crate::error::{ConsensusError, Result};
use crate::round::{BitSetMapper, CloudHash, MergeResult, UnsyncList};
use crate::policy::QuorumPolicy;
use crate::telemetry;

#[derive(Debug, Default)]
struct RoundSlot {
    state: NodeKeeperState,
    proposal: Option<UnsyncList>,
}

/// Authoritative holder of the active set between rounds.
///
/// State is split into independent lock domains: the active set with its
/// indexes, the admission state with the adopted proposal, the transient
/// address map and the cloud hash. A method that holds more than one takes
/// them in that order; the claim queue is always locked last.
pub struct NodeRegistry {
    auth: Arc<RwLock<dyn Authenticator>>,
    port_offset: u16,
    active: RwLock<ActiveSet>,
    transient: RwLock<TransientMap>,
    cloud_hash: RwLock<Option<CloudHash>>,
    round: Mutex<RoundSlot>,
    claims: ClaimQueue,
}

impl NodeRegistry {
    pub fn new(origin: NodeInfo, auth: Arc<RwLock<dyn Authenticator>>, port_offset: u16) -> Self {
        Self {
            auth,
            port_offset,
            active: RwLock::new(ActiveSet::new(origin)),
            transient: RwLock::new(TransientMap::default()),
            cloud_hash: RwLock::new(None),
            round: Mutex::new(RoundSlot::default()),
            claims: ClaimQueue::new(),
        }
    }

    /// Leaves `Undefined`. A discovery node is its own first member and is
    /// `Ready` at once; every other node waits to be admitted by a round.
    pub async fn initialize(&self, is_discovery: bool) {
        let mut active = self.active.write().await;
        let mut round = self.round.lock().await;
        if is_discovery {
            let origin = active.origin().clone();
            active.insert_all([origin]);
            round.state = NodeKeeperState::Ready;
        } else {
            round.state = NodeKeeperState::Waiting;
        }
        info!("registry initialized as {} (origin {})", round.state, active.origin().reference());
    }

    pub async fn origin(&self) -> NodeInfo {
        self.active.read().await.origin().clone()
    }

    pub async fn state(&self) -> NodeKeeperState {
        self.round.lock().await.state
    }

    pub async fn set_state(&self, state: NodeKeeperState) {
        self.round.lock().await.state = state;
    }

    /// Active members sorted by reference.
    pub async fn snapshot_active(&self) -> Vec<NodeInfo> {
        self.active.read().await.snapshot()
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    pub async fn active_node(&self, reference: &NodeReference) -> Option<NodeInfo> {
        self.active.read().await.get(reference).cloned()
    }

    pub async fn by_role(&self, role: StaticRole) -> Vec<NodeReference> {
        self.active.read().await.by_role(role)
    }

    pub async fn by_dynamic_role(&self, role: DynamicRole) -> Vec<NodeReference> {
        self.by_role(StaticRole::from(role)).await
    }

    pub async fn by_short_id(&self, short_id: ShortNodeId) -> Option<NodeInfo> {
        self.active.read().await.by_short_id(short_id).cloned()
    }

    pub async fn nodes_joined_during_previous_pulse(&self) -> bool {
        self.active.read().await.joined_during_previous_pulse()
    }

    /// Bootstrap-only insert that bypasses consensus. Also extends the base
    /// of an adopted proposal.
    pub async fn admin_insert(&self, nodes: Vec<NodeInfo>) {
        let mut active = self.active.write().await;
        let mut round = self.round.lock().await;

        let refs: Vec<String> = nodes.iter().map(|n| n.reference().to_string()).collect();
        let stored = active.insert_all(nodes);
        if let Some(proposal) = round.proposal.as_mut() {
            proposal.extend_base(stored);
        }
        telemetry::active_nodes(active.len());
        debug!("added active nodes: {}", refs.join(", "));
    }

    /// Records the consensus address of a node for the current round.
    pub async fn map_transient_address(
        &self,
        reference: NodeReference,
        short_id: ShortNodeId,
        address: &str,
    ) -> Result<String> {
        let consensus = consensus_address(address, self.port_offset)?;
        self.transient
            .write()
            .await
            .insert(reference, short_id, consensus.clone());
        debug!("added temporary mapping: {} -> ({}, {})", consensus, reference, short_id);
        Ok(consensus)
    }

    pub async fn clear_transient_addresses(&self) {
        self.transient.write().await.clear();
    }

    pub async fn resolve_consensus(&self, reference: &NodeReference) -> Option<String> {
        self.transient.read().await.by_reference(reference).cloned()
    }

    pub async fn resolve_consensus_short(&self, short_id: ShortNodeId) -> Option<String> {
        self.transient.read().await.by_short_id(short_id).cloned()
    }

    pub fn port_offset(&self) -> u16 {
        self.port_offset
    }

    pub async fn cloud_hash(&self) -> Option<CloudHash> {
        *self.cloud_hash.read().await
    }

    pub async fn set_cloud_hash(&self, hash: CloudHash) {
        *self.cloud_hash.write().await = Some(hash);
    }

    pub fn claim_queue(&self) -> &ClaimQueue {
        &self.claims
    }

    /// Fresh round proposal over the current active set.
    pub async fn unsync_list(&self, policy: QuorumPolicy) -> UnsyncList {
        let active = self.active.read().await;
        UnsyncList::new(active.origin().reference(), active.snapshot(), policy)
    }

    pub async fn build_origin_join_claim(&self) -> Result<JoinClaim> {
        let origin = self.origin().await;
        let auth = self.auth.read().await;
        JoinClaim::sign(origin, &*auth)
    }

    /// Fails with `MapperLookup` when the origin is not in `mapper`.
    pub async fn build_origin_announce_claim(&self, mapper: &BitSetMapper) -> Result<AnnounceClaim> {
        let origin = self.origin().await;
        let index = mapper.ref_to_index(&origin.reference())?;
        let node_count = u32::try_from(mapper.len()).map_err(|e| ConsensusError::Codec(e.to_string()))?;
        let announcer_index = u32::try_from(index).map_err(|e| ConsensusError::Codec(e.to_string()))?;
        let cloud_hash = self.cloud_hash().await;

        let auth = self.auth.read().await;
        let join = JoinClaim::sign(origin, &*auth)?;
        AnnounceClaim::sign(join, node_count, announcer_index, cloud_hash, &*auth)
    }

    pub async fn build_origin_leave_claim(&self) -> Result<LeaveClaim> {
        let origin = self.origin().await;
        let auth = self.auth.read().await;
        LeaveClaim::sign(origin.reference(), &*auth)
    }

    /// Records `list` as this round's candidate.
    ///
    /// A `Ready` node with a non-empty active set that finds itself missing
    /// from the candidates is excluded from consensus: `SelfExcluded`.
    pub async fn adopt_proposal(&self, list: UnsyncList) -> Result<()> {
        let active = self.active.read().await;
        let mut round = self.round.lock().await;

        let origin = list.origin();
        if !list.contains_candidate(&origin) && round.state == NodeKeeperState::Ready && !active.is_empty() {
            error!(target: "consensus", "EVENT:FATAL reason=self_excluded stage=proposal origin={}", origin);
            return Err(ConsensusError::SelfExcluded(origin));
        }

        round.proposal = Some(list);
        Ok(())
    }

    pub async fn proposal(&self) -> Option<UnsyncList> {
        self.round.lock().await.proposal.clone()
    }

    /// Replaces the active set with the merge of `list` and clears the
    /// round's address mappings.
    ///
    /// When the merge leaves the origin out, nothing is committed: a
    /// `Ready` member gets `SelfExcluded`, a node still waiting for
    /// admission gets `NotAdmitted`.
    pub async fn commit(&self, list: &UnsyncList) -> Result<MergeResult> {
        let merge = list.merged();

        let mut active = self.active.write().await;
        let mut round = self.round.lock().await;
        self.transient.write().await.clear();

        let origin = active.origin().reference();
        if merge.should_exit {
            round.proposal = None;
            if round.state == NodeKeeperState::Ready && !active.is_empty() {
                error!(target: "consensus", "EVENT:FATAL reason=self_excluded stage=commit origin={}", origin);
                return Err(ConsensusError::SelfExcluded(origin));
            }
            return Err(ConsensusError::NotAdmitted(origin));
        }

        let before = active.len();
        active.replace(merge.active.clone(), merge.nodes_joined_during_previous_pulse);
        if round.state != NodeKeeperState::Ready {
            info!("origin {} admitted, registry ready", origin);
        }
        round.state = NodeKeeperState::Ready;
        round.proposal = None;

        telemetry::active_nodes(active.len());
        info!("new active list confirmed, size {} -> {}", before, active.len());
        Ok(merge)
    }

    /// Administrative hard reset. Not part of the round cycle.
    ///
    /// With `seed_self` the origin becomes the only member and the node is
    /// `Ready`; otherwise the set is left empty and the node waits to be
    /// admitted again.
    pub async fn reset(&self, seed_self: bool) {
        warn!("registry reset (seed_self={})", seed_self);

        let mut active = self.active.write().await;
        let mut round = self.round.lock().await;
        self.transient.write().await.clear();
        *self.cloud_hash.write().await = None;
        self.claims.clear().await;

        active.clear();
        round.proposal = None;
        if seed_self {
            let origin = active.origin().clone();
            active.insert_all([origin]);
            round.state = NodeKeeperState::Ready;
        } else {
            round.state = NodeKeeperState::Waiting;
        }
        telemetry::active_nodes(active.len());
    }
}
