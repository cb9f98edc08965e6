use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::QuorumPolicy;

/// Tunables of the consensus layer. Plain data: loaded by the node and
/// handed to every component that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub quorum: QuorumPolicy,
    /// Deadline of each phase, and of every peer call issued in it.
    pub phase_timeout_ms: u64,
    /// Consensus traffic goes to the declared port plus this offset.
    pub consensus_port_offset: u16,
    pub pulse_interval_ms: u64,
    pub pulse_delta: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            quorum: QuorumPolicy::default(),
            phase_timeout_ms: 500,
            consensus_port_offset: 1,
            pulse_interval_ms: 2_000,
            pulse_delta: 10,
        }
    }
}

impl ConsensusConfig {
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_millis(self.phase_timeout_ms)
    }

    pub fn pulse_interval(&self) -> Duration {
        Duration::from_millis(self.pulse_interval_ms)
    }
}
