//! Signed membership assertions and the queue they wait in until the next
//! round drains it.

mod queue;

pub use queue::ClaimQueue;

use pulse_common::auth::Authenticator;
use pulse_common::{NodeInfo, NodeReference};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::round::CloudHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimKind {
    Join,
    Announce,
    Leave,
}

/// A node's signed request to be admitted, carrying the snapshot it wants
/// to be admitted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinClaim {
    pub node: NodeInfo,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
struct JoinSignView<'a> {
    kind: ClaimKind,
    node: &'a NodeInfo,
}

impl JoinClaim {
    pub fn signing_bytes(node: &NodeInfo) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&JoinSignView {
            kind: ClaimKind::Join,
            node,
        })?)
    }

    pub fn sign(node: NodeInfo, auth: &dyn Authenticator) -> Result<Self> {
        let signature = auth.sign(&Self::signing_bytes(&node)?)?;
        Ok(Self { node, signature })
    }

    /// The signature must verify under the embedded key, and the reference
    /// must be the one that key derives.
    pub fn verify(&self, auth: &dyn Authenticator) -> Result<bool> {
        if NodeReference::from_public_key(self.node.public_key()) != self.node.reference() {
            return Ok(false);
        }
        Ok(auth.verify_with_key(
            &Self::signing_bytes(&self.node)?,
            &self.signature,
            self.node.public_key(),
        )?)
    }
}

/// Join claim of a node that is already a member, plus its view of the
/// round it announces itself in. The view is signed separately so a relay
/// cannot rewrite it under a valid join signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceClaim {
    pub join: JoinClaim,
    pub node_count: u32,
    pub announcer_index: u32,
    pub cloud_hash: Option<CloudHash>,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
struct AnnounceSignView<'a> {
    kind: ClaimKind,
    node: &'a NodeReference,
    node_count: u32,
    announcer_index: u32,
    cloud_hash: &'a Option<CloudHash>,
}

impl AnnounceClaim {
    pub fn signing_bytes(
        node: &NodeReference,
        node_count: u32,
        announcer_index: u32,
        cloud_hash: &Option<CloudHash>,
    ) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&AnnounceSignView {
            kind: ClaimKind::Announce,
            node,
            node_count,
            announcer_index,
            cloud_hash,
        })?)
    }

    pub fn sign(
        join: JoinClaim,
        node_count: u32,
        announcer_index: u32,
        cloud_hash: Option<CloudHash>,
        auth: &dyn Authenticator,
    ) -> Result<Self> {
        let bytes = Self::signing_bytes(&join.node.reference(), node_count, announcer_index, &cloud_hash)?;
        let signature = auth.sign(&bytes)?;
        Ok(Self {
            join,
            node_count,
            announcer_index,
            cloud_hash,
            signature,
        })
    }

    /// Both the embedded join claim and the announce view must verify under
    /// the announcer's key.
    pub fn verify(&self, auth: &dyn Authenticator) -> Result<bool> {
        if !self.join.verify(auth)? {
            return Ok(false);
        }
        let bytes = Self::signing_bytes(
            &self.join.node.reference(),
            self.node_count,
            self.announcer_index,
            &self.cloud_hash,
        )?;
        Ok(auth.verify_with_key(&bytes, &self.signature, self.join.node.public_key())?)
    }
}

/// Signed notice that a node is stopping gracefully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveClaim {
    pub node: NodeReference,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
struct LeaveSignView<'a> {
    kind: ClaimKind,
    node: &'a NodeReference,
}

impl LeaveClaim {
    pub fn signing_bytes(node: &NodeReference) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&LeaveSignView {
            kind: ClaimKind::Leave,
            node,
        })?)
    }

    pub fn sign(node: NodeReference, auth: &dyn Authenticator) -> Result<Self> {
        let signature = auth.sign(&Self::signing_bytes(&node)?)?;
        Ok(Self { node, signature })
    }

    /// Verified against the key the leaving node was admitted with.
    pub fn verify(&self, auth: &dyn Authenticator, member: &NodeInfo) -> Result<bool> {
        if member.reference() != self.node {
            return Ok(false);
        }
        Ok(auth.verify_with_key(
            &Self::signing_bytes(&self.node)?,
            &self.signature,
            member.public_key(),
        )?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Claim {
    Join(JoinClaim),
    Announce(AnnounceClaim),
    Leave(LeaveClaim),
}

impl Claim {
    pub fn kind(&self) -> ClaimKind {
        match self {
            Claim::Join(_) => ClaimKind::Join,
            Claim::Announce(_) => ClaimKind::Announce,
            Claim::Leave(_) => ClaimKind::Leave,
        }
    }

    /// The node the claim is about.
    pub fn node_reference(&self) -> NodeReference {
        match self {
            Claim::Join(c) => c.node.reference(),
            Claim::Announce(c) => c.join.node.reference(),
            Claim::Leave(c) => c.node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_common::auth::ed25519::Ed25519Authenticator;
    use pulse_common::{PulseNumber, StaticRole};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn signer(seed: u64) -> (Ed25519Authenticator, NodeInfo) {
        let auth = Ed25519Authenticator::generate(&mut StdRng::seed_from_u64(seed));
        let node = NodeInfo::from_public_key(auth.public_key(), StaticRole::LightMaterial, "127.0.0.1:9000", "0.1.0");
        (auth, node)
    }

    #[test]
    fn test_join_claim_verifies() {
        let (auth, node) = signer(1);
        let claim = JoinClaim::sign(node, &auth).unwrap();
        assert!(claim.verify(&auth).unwrap());
    }

    #[test]
    fn test_tampered_join_claim_is_rejected() {
        let (auth, node) = signer(1);
        let mut claim = JoinClaim::sign(node, &auth).unwrap();
        claim.node = claim.node.with_short_id(pulse_common::ShortNodeId(7));
        assert!(!claim.verify(&auth).unwrap());
    }

    #[test]
    fn test_join_claim_for_foreign_reference_is_rejected() {
        let (auth, _) = signer(1);
        let (_, other) = signer(2);
        let spoofed = NodeInfo::new(
            other.reference(),
            other.short_id(),
            StaticRole::Virtual,
            auth.public_key(),
            "127.0.0.1:9000",
            "0.1.0",
        );
        let claim = JoinClaim::sign(spoofed, &auth).unwrap();
        assert!(!claim.verify(&auth).unwrap());
    }

    #[test]
    fn test_announce_claim_covers_round_view() {
        let (auth, node) = signer(4);
        let join = JoinClaim::sign(node, &auth).unwrap();
        let claim = AnnounceClaim::sign(join, 5, 2, None, &auth).unwrap();
        assert!(claim.verify(&auth).unwrap());

        let mut inflated = claim.clone();
        inflated.node_count = 50;
        assert!(!inflated.verify(&auth).unwrap());

        let mut moved = claim.clone();
        moved.announcer_index = 0;
        assert!(!moved.verify(&auth).unwrap());

        let mut rehashed = claim;
        rehashed.cloud_hash = Some(CloudHash::compute(PulseNumber(65537), std::iter::empty::<&NodeInfo>()));
        assert!(!rehashed.verify(&auth).unwrap());
    }

    #[test]
    fn test_announce_signed_by_another_key_is_rejected() {
        let (auth, node) = signer(4);
        let (mallory, _) = signer(5);
        let join = JoinClaim::sign(node, &auth).unwrap();
        let claim = AnnounceClaim::sign(join, 5, 2, None, &mallory).unwrap();
        assert!(!claim.verify(&auth).unwrap());
    }

    #[test]
    fn test_leave_claim_needs_member_key() {
        let (alice, alice_node) = signer(1);
        let (_, bob_node) = signer(2);
        let claim = LeaveClaim::sign(alice_node.reference(), &alice).unwrap();
        assert!(claim.verify(&alice, &alice_node).unwrap());
        assert!(!claim.verify(&alice, &bob_node).unwrap());
    }

    #[test]
    fn test_claim_reference() {
        let (auth, node) = signer(3);
        let reference = node.reference();
        let claim = Claim::Join(JoinClaim::sign(node, &auth).unwrap());
        assert_eq!(claim.node_reference(), reference);
        assert_eq!(claim.kind(), ClaimKind::Join);
    }
}
