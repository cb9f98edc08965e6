use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulse_common::auth::Authenticator;
use pulse_network::{decode, encode, Envelope, FutureError, PayloadType, RequestHandler};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::inbox::RoundInbox;
use super::membership::JoinResponse;
use super::packets::PhasePacket;
use super::RoundPhase;
use crate::claims::{Claim, JoinClaim, LeaveClaim};
use crate::error::{ConsensusError, Result};
use crate::registry::{consensus_address, NodeKeeperState, NodeRegistry};

/// Inbound side of a node's consensus endpoint.
///
/// A phase request is recorded in the inbox and answered with this node's
/// own packet of the same phase and pulse. Join and leave requests feed the
/// claim queue for the next round.
pub struct ConsensusHandler {
    registry: Arc<NodeRegistry>,
    inbox: Arc<RoundInbox>,
    auth: Arc<RwLock<dyn Authenticator>>,
    phase_timeout: Duration,
}

impl ConsensusHandler {
    pub fn new(
        registry: Arc<NodeRegistry>,
        inbox: Arc<RoundInbox>,
        auth: Arc<RwLock<dyn Authenticator>>,
        phase_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            inbox,
            auth,
            phase_timeout,
        }
    }

    async fn handle_phase(&self, request: &Envelope) -> Result<Vec<u8>> {
        let packet: PhasePacket = decode(&request.body)?;
        let phase = packet.phase();
        if phase.payload_type() != request.payload_type {
            return Err(ConsensusError::Codec(format!(
                "{} packet sent as {}",
                phase, request.payload_type
            )));
        }

        let pulse = packet.pulse();
        let sender = packet.sender();
        let expected = match self.sender_address(&packet).await {
            Ok(address) => address,
            // A newcomer may be ahead of us; once our own packet of this
            // phase is out, its mapping is in place.
            Err(_) if phase != RoundPhase::Phase1 => {
                self.inbox.wait_local(pulse, phase, self.phase_timeout).await;
                self.sender_address(&packet).await?
            }
            Err(e) => return Err(e),
        };
        if expected != request.sender {
            warn!("{} packet for {} arrived from {}, expected {}", phase, sender, request.sender, expected);
            return Err(ConsensusError::InvalidAddress(format!(
                "{} does not speak for {}",
                request.sender, sender
            )));
        }
        if packet.phase() == RoundPhase::Phase1 {
            self.inbox.remember_address(pulse, sender, expected).await;
        }

        if !self.inbox.record(packet).await {
            debug!("ignoring stale or repeated {} packet from {} for pulse {}", phase, sender, pulse);
        }

        match self.inbox.wait_local(pulse, phase, self.phase_timeout).await {
            Some(local) => Ok(encode(&local)?),
            None => Err(ConsensusError::Future(FutureError::Timeout(self.phase_timeout))),
        }
    }

    /// Consensus address `packet` must come from: the round's mapping or the
    /// active record for members, the verified Phase 1 claim for newcomers.
    async fn sender_address(&self, packet: &PhasePacket) -> Result<String> {
        let sender = packet.sender();
        if let Some(address) = self.registry.resolve_consensus(&sender).await {
            return Ok(address);
        }
        if let Some(member) = self.registry.active_node(&sender).await {
            return consensus_address(member.address(), self.registry.port_offset());
        }
        if let Some(address) = self.inbox.remembered_address(packet.pulse(), &sender).await {
            return Ok(address);
        }

        let PhasePacket::Phase1(p1) = packet else {
            return Err(ConsensusError::InvalidAddress(format!("no known address for {}", sender)));
        };
        let (node, verified) = {
            let auth = self.auth.read().await;
            match &p1.origin_claim {
                Claim::Join(c) => (&c.node, c.verify(&*auth)?),
                Claim::Announce(c) => (&c.join.node, c.verify(&*auth)?),
                Claim::Leave(_) => {
                    return Err(ConsensusError::InvalidClaim(format!("{} opened a round with a leave claim", sender)))
                }
            }
        };
        if node.reference() != sender || !verified {
            return Err(ConsensusError::InvalidClaim(format!("unverifiable origin claim from {}", sender)));
        }
        consensus_address(node.address(), self.registry.port_offset())
    }

    async fn handle_join(&self, request: &Envelope) -> Result<Vec<u8>> {
        if self.registry.state().await != NodeKeeperState::Ready {
            return Err(ConsensusError::InvalidClaim("node is not ready to admit joiners".to_string()));
        }

        let claim: JoinClaim = decode(&request.body)?;
        let verified = {
            let auth = self.auth.read().await;
            claim.verify(&*auth)?
        };
        if !verified {
            warn!("rejecting join claim with a bad signature from {}", request.sender);
            return Err(ConsensusError::InvalidClaim(format!("bad join signature for {}", claim.node.reference())));
        }

        let reference = claim.node.reference();
        self.registry.claim_queue().push(Claim::Join(claim)).await;
        info!(target: "consensus", "EVENT:JOIN_CLAIM node={} via={} queued=true", reference, request.sender);

        Ok(encode(&JoinResponse {
            active: self.registry.snapshot_active().await,
        })?)
    }

    async fn handle_leave(&self, request: &Envelope) -> Result<Vec<u8>> {
        let claim: LeaveClaim = decode(&request.body)?;
        let member = self
            .registry
            .active_node(&claim.node)
            .await
            .ok_or_else(|| ConsensusError::InvalidClaim(format!("{} is not an active member", claim.node)))?;

        let verified = {
            let auth = self.auth.read().await;
            claim.verify(&*auth, &member)?
        };
        if !verified {
            return Err(ConsensusError::InvalidClaim(format!("bad leave signature for {}", claim.node)));
        }

        let reference = claim.node;
        self.registry.claim_queue().push(Claim::Leave(claim)).await;
        info!(target: "consensus", "EVENT:LEAVE_CLAIM node={} queued=true", reference);
        Ok(Vec::new())
    }
}

#[async_trait]
impl RequestHandler for ConsensusHandler {
    async fn handle(&self, request: Envelope) -> std::result::Result<Vec<u8>, String> {
        let result = match request.payload_type {
            PayloadType::Phase1 | PayloadType::Phase2 | PayloadType::Phase3 => self.handle_phase(&request).await,
            PayloadType::Join => self.handle_join(&request).await,
            PayloadType::Leave => self.handle_leave(&request).await,
        };
        result.map_err(|e| {
            debug!("{} request from {} failed: {}", request.payload_type, request.sender, e);
            e.to_string()
        })
    }
}
