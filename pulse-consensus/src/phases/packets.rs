use pulse_common::auth::Authenticator;
use pulse_common::{NodeReference, PulseNumber};
use serde::{Deserialize, Serialize};

use super::RoundPhase;
use crate::claims::Claim;
use crate::error::Result;
use crate::round::{Bitset, CloudHash, MapperDigest};

/// Claims a node brings into a round: its own join or announce claim and
/// whatever its queue held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase1Packet {
    pub pulse: PulseNumber,
    pub sender: NodeReference,
    pub origin_claim: Claim,
    pub claims: Vec<Claim>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase2Packet {
    pub pulse: PulseNumber,
    pub sender: NodeReference,
    pub mapper_digest: MapperDigest,
    pub bitset: Bitset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase3Packet {
    pub pulse: PulseNumber,
    pub sender: NodeReference,
    pub cloud_hash: CloudHash,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

#[derive(Serialize)]
struct Phase3SignView<'a> {
    pulse: PulseNumber,
    sender: &'a NodeReference,
    cloud_hash: &'a CloudHash,
}

impl Phase3Packet {
    pub fn signing_bytes(pulse: PulseNumber, sender: &NodeReference, cloud_hash: &CloudHash) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&Phase3SignView {
            pulse,
            sender,
            cloud_hash,
        })?)
    }

    pub fn sign(
        pulse: PulseNumber,
        sender: NodeReference,
        cloud_hash: CloudHash,
        auth: &dyn Authenticator,
    ) -> Result<Self> {
        let signature = auth.sign(&Self::signing_bytes(pulse, &sender, &cloud_hash)?)?;
        Ok(Self {
            pulse,
            sender,
            cloud_hash,
            signature,
        })
    }

    pub fn verify(&self, auth: &dyn Authenticator, public_key: &[u8]) -> Result<bool> {
        let bytes = Self::signing_bytes(self.pulse, &self.sender, &self.cloud_hash)?;
        Ok(auth.verify_with_key(&bytes, &self.signature, public_key)?)
    }
}

/// Body of every phase request and response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhasePacket {
    Phase1(Phase1Packet),
    Phase2(Phase2Packet),
    Phase3(Phase3Packet),
}

impl PhasePacket {
    pub fn phase(&self) -> RoundPhase {
        match self {
            PhasePacket::Phase1(_) => RoundPhase::Phase1,
            PhasePacket::Phase2(_) => RoundPhase::Phase2,
            PhasePacket::Phase3(_) => RoundPhase::Phase3,
        }
    }

    pub fn pulse(&self) -> PulseNumber {
        match self {
            PhasePacket::Phase1(p) => p.pulse,
            PhasePacket::Phase2(p) => p.pulse,
            PhasePacket::Phase3(p) => p.pulse,
        }
    }

    pub fn sender(&self) -> NodeReference {
        match self {
            PhasePacket::Phase1(p) => p.sender,
            PhasePacket::Phase2(p) => p.sender,
            PhasePacket::Phase3(p) => p.sender,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_common::auth::ed25519::Ed25519Authenticator;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_phase3_signature() {
        let auth = Ed25519Authenticator::generate(&mut StdRng::seed_from_u64(5));
        let sender = NodeReference::from_public_key(&auth.public_key());
        let packet = Phase3Packet::sign(PulseNumber(70_000), sender, CloudHash::from_bytes([4; 32]), &auth).unwrap();
        assert!(packet.verify(&auth, &auth.public_key()).unwrap());

        let mut forged = packet.clone();
        forged.cloud_hash = CloudHash::from_bytes([5; 32]);
        assert!(!forged.verify(&auth, &auth.public_key()).unwrap());
    }
}
