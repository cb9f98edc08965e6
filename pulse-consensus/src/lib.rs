//! Pulse-synchronized membership consensus.
//!
//! Each pulse starts one round of three phases over the node's consensus
//! endpoint: claims are exchanged, liveness bitsets are voted on, and the
//! signed hash of the resulting active set is compared. A round either
//! commits the new active set into the [`NodeRegistry`] or aborts and
//! leaves it untouched.

pub mod claims;
pub mod config;
pub mod error;
pub mod phases;
pub mod policy;
pub mod pulse;
pub mod registry;
pub mod round;
pub mod supervisor;
pub mod telemetry;

pub use claims::{AnnounceClaim, Claim, ClaimKind, ClaimQueue, JoinClaim, LeaveClaim};
pub use config::ConsensusConfig;
pub use error::{ConsensusError, Result};
pub use phases::{
    announce_leave, request_join, ConsensusHandler, JoinResponse, PhaseExecutor, PhasePacket, RoundInbox,
    RoundOutcome, RoundPhase, RoundReport,
};
pub use policy::{QuorumPolicy, Ratio};
pub use pulse::Pulsar;
pub use registry::{consensus_address, NodeKeeperState, NodeRegistry};
pub use round::{BitSetMapper, Bitset, CloudHash, MergeResult, UnsyncList};
pub use supervisor::{ShutdownReason, ShutdownSupervisor};
