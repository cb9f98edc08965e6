//! The three-phase round protocol: packets, the per-pulse inbox shared by
//! the executor and the inbound handler, and the join/leave handshakes.

mod executor;
mod handler;
mod inbox;
mod membership;
mod packets;

pub use executor::{PhaseExecutor, RoundOutcome, RoundReport};
pub use handler::ConsensusHandler;
pub use inbox::RoundInbox;
pub use membership::{announce_leave, request_join, JoinResponse};
pub use packets::{Phase1Packet, Phase2Packet, Phase3Packet, PhasePacket};

use std::fmt;

use pulse_network::PayloadType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoundPhase {
    /// Claim exchange.
    Phase1,
    /// Liveness bitset exchange.
    Phase2,
    /// Signed cloud hash exchange.
    Phase3,
}

impl RoundPhase {
    pub fn payload_type(self) -> PayloadType {
        match self {
            RoundPhase::Phase1 => PayloadType::Phase1,
            RoundPhase::Phase2 => PayloadType::Phase2,
            RoundPhase::Phase3 => PayloadType::Phase3,
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundPhase::Phase1 => "phase1",
            RoundPhase::Phase2 => "phase2",
            RoundPhase::Phase3 => "phase3",
        };
        write!(f, "{}", s)
    }
}
