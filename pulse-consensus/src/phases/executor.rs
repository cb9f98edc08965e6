use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::future::join_all;
use pulse_common::auth::Authenticator;
use pulse_common::{NodeInfo, NodeReference, Pulse, PulseNumber};
use pulse_network::{encode, CancelCallback, Future, FutureError, Messenger};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::inbox::RoundInbox;
use super::packets::{Phase1Packet, Phase2Packet, Phase3Packet, PhasePacket};
use super::RoundPhase;
use crate::claims::Claim;
use crate::config::ConsensusConfig;
use crate::error::{ConsensusError, Result};
use crate::registry::{consensus_address, NodeRegistry};
use crate::round::{BitSetMapper, Bitset, CloudHash, UnsyncList};
use crate::telemetry;

type Abstentions = Arc<StdMutex<BTreeSet<NodeReference>>>;
type PhaseResult<T> = std::result::Result<T, (RoundPhase, ConsensusError)>;

trait AtPhase<T> {
    fn at(self, phase: RoundPhase) -> PhaseResult<T>;
}

impl<T> AtPhase<T> for Result<T> {
    fn at(self, phase: RoundPhase) -> PhaseResult<T> {
        self.map_err(|e| (phase, e))
    }
}

/// What a committed round changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub pulse: PulseNumber,
    pub active_before: usize,
    pub active_after: usize,
    pub nodes_joined_during_previous_pulse: bool,
    /// A supermajority of phase-3 respondents reported another cloud hash.
    pub divergence: bool,
    /// Peers whose calls from this node went unanswered, ascending.
    pub abstentions: Vec<NodeReference>,
    pub cloud_hash: CloudHash,
}

#[derive(Debug)]
pub enum RoundOutcome {
    Committed(RoundReport),
    Aborted {
        pulse: PulseNumber,
        phase: RoundPhase,
        reason: ConsensusError,
    },
}

impl RoundOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, RoundOutcome::Committed(_))
    }

    pub fn report(&self) -> Option<&RoundReport> {
        match self {
            RoundOutcome::Committed(report) => Some(report),
            RoundOutcome::Aborted { .. } => None,
        }
    }
}

/// Drives one consensus round per pulse.
///
/// Every peer call of a phase goes out in parallel and is backed by a
/// [`Future`] with the phase timeout; the phase ends when all of them have
/// resolved or timed out. A peer that does not answer is an abstention.
/// A phase without a quorum of respondents aborts the round, and claims
/// taken from the queue go back into it.
pub struct PhaseExecutor {
    registry: Arc<NodeRegistry>,
    messenger: Arc<dyn Messenger>,
    auth: Arc<RwLock<dyn Authenticator>>,
    inbox: Arc<RoundInbox>,
    config: ConsensusConfig,
}

impl PhaseExecutor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        messenger: Arc<dyn Messenger>,
        auth: Arc<RwLock<dyn Authenticator>>,
        inbox: Arc<RoundInbox>,
        config: ConsensusConfig,
    ) -> Self {
        Self {
            registry,
            messenger,
            auth,
            inbox,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Runs the round of `pulse`.
    ///
    /// Recoverable failures come back as [`RoundOutcome::Aborted`]; only
    /// fatal errors are returned as `Err`, for the supervisor.
    pub async fn run_round(&self, pulse: &Pulse) -> Result<RoundOutcome> {
        let number = pulse.number;
        self.inbox.begin(number).await;

        let origin = self.registry.origin().await;
        info!(
            target: "consensus",
            "EVENT:ROUND_START pulse={} origin={} state={}",
            number,
            origin.reference(),
            self.registry.state().await
        );

        let queued = self.registry.claim_queue().drain().await;
        match self.execute(number, &origin, &queued).await {
            Ok(report) => {
                telemetry::round_committed();
                info!(
                    target: "consensus",
                    "EVENT:COMMIT pulse={} active={}->{} joined={} divergence={} abstentions={} cloud_hash={}",
                    number,
                    report.active_before,
                    report.active_after,
                    report.nodes_joined_during_previous_pulse,
                    report.divergence,
                    report.abstentions.len(),
                    report.cloud_hash
                );
                Ok(RoundOutcome::Committed(report))
            }
            Err((phase, reason)) => {
                self.registry.claim_queue().restore(queued).await;
                if reason.is_fatal() {
                    error!(target: "consensus", "EVENT:FATAL pulse={} phase={} reason={}", number, phase, reason);
                    return Err(reason);
                }
                telemetry::round_aborted();
                warn!(target: "consensus", "EVENT:ABORT pulse={} phase={} reason={}", number, phase, reason);
                Ok(RoundOutcome::Aborted {
                    pulse: number,
                    phase,
                    reason,
                })
            }
        }
    }

    async fn execute(&self, pulse: PulseNumber, origin: &NodeInfo, queued: &[Claim]) -> PhaseResult<RoundReport> {
        let origin_ref = origin.reference();
        let abstentions: Abstentions = Arc::new(StdMutex::new(BTreeSet::new()));

        // Phase 1: claim exchange with the base set.
        let base = self.registry.snapshot_active().await;
        if base.is_empty() {
            return Err((RoundPhase::Phase1, ConsensusError::NotAdmitted(origin_ref)));
        }
        let base_map: BTreeMap<NodeReference, NodeInfo> = base.iter().map(|n| (n.reference(), n.clone())).collect();

        self.registry.clear_transient_addresses().await;
        for node in &base {
            if let Err(e) = self
                .registry
                .map_transient_address(node.reference(), node.short_id(), node.address())
                .await
            {
                warn!("no consensus address for {}: {}", node.reference(), e);
            }
        }

        let origin_claim = if base_map.contains_key(&origin_ref) {
            let mapper = BitSetMapper::from_nodes(&base);
            Claim::Announce(self.registry.build_origin_announce_claim(&mapper).await.at(RoundPhase::Phase1)?)
        } else {
            Claim::Join(self.registry.build_origin_join_claim().await.at(RoundPhase::Phase1)?)
        };

        let local = Phase1Packet {
            pulse,
            sender: origin_ref,
            origin_claim,
            claims: queued.to_vec(),
        };
        let peers: Vec<NodeInfo> = base.iter().filter(|n| n.reference() != origin_ref).cloned().collect();
        self.exchange(pulse, PhasePacket::Phase1(local.clone()), &peers, &abstentions)
            .await
            .at(RoundPhase::Phase1)?;

        let phase1 = self.inbox.received(pulse, RoundPhase::Phase1).await;
        self.check_quorum(
            pulse,
            RoundPhase::Phase1,
            count_respondents(phase1.keys(), &base_map, origin_ref),
            base.len(),
        )
        .at(RoundPhase::Phase1)?;

        let mut list = UnsyncList::new(origin_ref, base.clone(), self.config.quorum.clone());
        let remote = phase1.values().filter_map(|p| match p {
            PhasePacket::Phase1(p) => Some(p),
            _ => None,
        });
        for packet in std::iter::once(&local).chain(remote) {
            for claim in std::iter::once(&packet.origin_claim).chain(packet.claims.iter()) {
                if self.verify_claim(claim, &base_map).await {
                    list.add_claim(claim);
                } else {
                    warn!("dropping unverifiable {:?} claim for {}", claim.kind(), claim.node_reference());
                }
            }
        }

        let candidates = list.candidates();
        for node in candidates.iter().filter(|n| list.is_newcomer(&n.reference())) {
            info!(target: "consensus", "EVENT:JOIN_CLAIM pulse={} node={}", pulse, node.reference());
            if let Err(e) = self
                .registry
                .map_transient_address(node.reference(), node.short_id(), node.address())
                .await
            {
                warn!("no consensus address for joiner {}: {}", node.reference(), e);
            }
        }
        for leaver in base_map.keys().filter(|r| list.is_leaving(r)) {
            info!(target: "consensus", "EVENT:LEAVE_CLAIM pulse={} node={}", pulse, leaver);
        }

        // Phase 2: liveness bitsets over the candidate mapper.
        let mapper = list.mapper();
        let digest = mapper.digest();
        let mut bitset = Bitset::new(mapper.len());
        for (index, reference) in mapper.refs().iter().enumerate() {
            if *reference == origin_ref || phase1.contains_key(reference) || list.is_newcomer(reference) {
                bitset.set(index);
            }
        }
        list.add_vote(origin_ref, &digest, bitset.clone());

        let local = PhasePacket::Phase2(Phase2Packet {
            pulse,
            sender: origin_ref,
            mapper_digest: digest,
            bitset,
        });
        let peers: Vec<NodeInfo> = candidates.iter().filter(|n| n.reference() != origin_ref).cloned().collect();
        self.exchange(pulse, local, &peers, &abstentions).await.at(RoundPhase::Phase2)?;

        let phase2 = self.inbox.received(pulse, RoundPhase::Phase2).await;
        for (sender, packet) in &phase2 {
            if let PhasePacket::Phase2(p) = packet {
                if list.contains_candidate(sender) {
                    list.add_vote(*sender, &p.mapper_digest, p.bitset.clone());
                }
            }
        }
        let candidate_map: BTreeMap<NodeReference, NodeInfo> =
            candidates.iter().map(|n| (n.reference(), n.clone())).collect();
        self.check_quorum(
            pulse,
            RoundPhase::Phase2,
            count_respondents(phase2.keys(), &candidate_map, origin_ref),
            candidates.len(),
        )
        .at(RoundPhase::Phase2)?;
        debug!("pulse {}: {} voters over {} candidates", pulse, list.voters(), mapper.len());

        self.registry.adopt_proposal(list.clone()).await.at(RoundPhase::Phase2)?;

        // Phase 3: signed cloud hash exchange, then commit.
        let merge = list.merged();
        let cloud_hash = CloudHash::compute(pulse, merge.active.values());
        let local = {
            let auth = self.auth.read().await;
            Phase3Packet::sign(pulse, origin_ref, cloud_hash, &*auth).at(RoundPhase::Phase3)?
        };
        let peers: Vec<NodeInfo> = merge.active.values().filter(|n| n.reference() != origin_ref).cloned().collect();
        self.exchange(pulse, PhasePacket::Phase3(local), &peers, &abstentions)
            .await
            .at(RoundPhase::Phase3)?;

        let phase3 = self.inbox.received(pulse, RoundPhase::Phase3).await;
        let mut confirmed = BTreeSet::new();
        let mut disagreeing = 0;
        for (sender, packet) in &phase3 {
            let (PhasePacket::Phase3(p), Some(member)) = (packet, merge.active.get(sender)) else {
                continue;
            };
            if !self.verify_hash(p, member).await {
                warn!("invalid cloud hash signature from {}", sender);
                continue;
            }
            confirmed.insert(*sender);
            if p.cloud_hash != cloud_hash {
                disagreeing += 1;
            }
        }
        let respondents = confirmed.len() + 1;
        self.check_quorum(pulse, RoundPhase::Phase3, respondents, merge.active.len())
            .at(RoundPhase::Phase3)?;

        let divergence = disagreeing > 0 && self.config.quorum.retains(disagreeing, respondents);
        if divergence {
            telemetry::divergence();
            warn!(
                target: "consensus",
                "EVENT:DIVERGENCE pulse={} local={} disagreeing={} respondents={}",
                pulse, cloud_hash, disagreeing, respondents
            );
        }

        let committed = self.registry.commit(&list).await.at(RoundPhase::Phase3)?;
        self.registry.set_cloud_hash(cloud_hash).await;

        let abstentions = abstentions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();

        Ok(RoundReport {
            pulse,
            active_before: base.len(),
            active_after: committed.active.len(),
            nodes_joined_during_previous_pulse: committed.nodes_joined_during_previous_pulse,
            divergence,
            abstentions,
            cloud_hash,
        })
    }

    /// Publishes `local` for inbound requests of its phase, sends it to every
    /// peer and records the packets they answer with.
    async fn exchange(
        &self,
        pulse: PulseNumber,
        local: PhasePacket,
        peers: &[NodeInfo],
        abstentions: &Abstentions,
    ) -> Result<()> {
        let phase = local.phase();
        let body = encode(&local)?;
        self.inbox.set_local(local).await;
        let timeout = self.config.phase_timeout();

        let mut pending: Vec<(NodeReference, Arc<Future>)> = Vec::with_capacity(peers.len());
        for peer in peers {
            let reference = peer.reference();
            let address = match self.peer_address(peer).await {
                Ok(address) => address,
                Err(e) => {
                    warn!("cannot reach {} in {}: {}", reference, phase, e);
                    abstain(abstentions, reference);
                    continue;
                }
            };
            let on_cancel = abstention_callback(abstentions, reference);
            match self
                .messenger
                .send_request(&address, phase.payload_type(), body.clone(), Some(on_cancel))
                .await
            {
                Ok(future) => pending.push((reference, future)),
                Err(e) => {
                    warn!("{} request to {} failed: {}", phase, reference, e);
                    abstain(abstentions, reference);
                }
            }
        }

        let responses = join_all(
            pending
                .into_iter()
                .map(|(reference, future)| async move { (reference, future.await_result(timeout).await) }),
        )
        .await;

        for (reference, response) in responses {
            match response {
                Ok(envelope) => {
                    if let Some(reason) = envelope.error.as_deref() {
                        debug!("{} refused {}: {}", reference, phase, reason);
                        abstain(abstentions, reference);
                        continue;
                    }
                    match envelope.decode_body::<PhasePacket>() {
                        Ok(packet)
                            if packet.phase() == phase && packet.pulse() == pulse && packet.sender() == reference =>
                        {
                            self.inbox.record(packet).await;
                        }
                        Ok(_) => {
                            warn!("{} answered {} with a packet of another round", reference, phase);
                            abstain(abstentions, reference);
                        }
                        Err(e) => {
                            warn!("undecodable {} response from {}: {}", phase, reference, e);
                            abstain(abstentions, reference);
                        }
                    }
                }
                Err(FutureError::AlreadyConsumed) => {
                    error!("{} response from {} consumed twice", phase, reference);
                }
                // Counted by the cancel callback.
                Err(_) => {}
            }
        }
        Ok(())
    }

    async fn peer_address(&self, peer: &NodeInfo) -> Result<String> {
        match self.registry.resolve_consensus(&peer.reference()).await {
            Some(address) => Ok(address),
            None => consensus_address(peer.address(), self.registry.port_offset()),
        }
    }

    fn check_quorum(&self, pulse: PulseNumber, phase: RoundPhase, respondents: usize, expected: usize) -> Result<()> {
        let required = self.config.quorum.required_respondents(expected);
        if respondents < required {
            return Err(ConsensusError::QuorumNotReached {
                phase,
                respondents,
                expected,
                required,
            });
        }
        info!(
            target: "consensus",
            "EVENT:PHASE_DONE pulse={} phase={} respondents={} expected={}",
            pulse, phase, respondents, expected
        );
        Ok(())
    }

    async fn verify_claim(&self, claim: &Claim, base: &BTreeMap<NodeReference, NodeInfo>) -> bool {
        let auth = self.auth.read().await;
        let verdict = match claim {
            Claim::Join(c) => c.verify(&*auth),
            Claim::Announce(c) => match base.get(&c.join.node.reference()) {
                Some(member) if member.public_key() != c.join.node.public_key() => Ok(false),
                _ => c.verify(&*auth),
            },
            Claim::Leave(c) => match base.get(&c.node) {
                Some(member) => c.verify(&*auth, member),
                None => Ok(false),
            },
        };
        verdict.unwrap_or_else(|e| {
            debug!("claim verification failed: {}", e);
            false
        })
    }

    async fn verify_hash(&self, packet: &Phase3Packet, member: &NodeInfo) -> bool {
        let auth = self.auth.read().await;
        packet.verify(&*auth, member.public_key()).unwrap_or(false)
    }
}

/// Distinct expected participants other than the origin that exchanged a
/// packet, plus the origin itself.
fn count_respondents<'a>(
    senders: impl Iterator<Item = &'a NodeReference>,
    expected: &BTreeMap<NodeReference, NodeInfo>,
    origin: NodeReference,
) -> usize {
    senders.filter(|r| **r != origin && expected.contains_key(r)).count() + 1
}

fn abstain(abstentions: &Abstentions, reference: NodeReference) {
    let inserted = abstentions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(reference);
    if inserted {
        telemetry::peer_abstained();
    }
}

fn abstention_callback(abstentions: &Abstentions, reference: NodeReference) -> CancelCallback {
    let abstentions = Arc::clone(abstentions);
    Box::new(move |_: &Future| abstain(&abstentions, reference))
}
