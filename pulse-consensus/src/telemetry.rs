//! Metric names of the consensus layer. Without an installed recorder the
//! `metrics` macros are no-ops.

use metrics::{counter, gauge};

/// Rounds that ended with a commit.
pub const ROUNDS_COMMITTED: &str = "consensus_rounds_committed_total";
/// Rounds aborted for lack of quorum or a recoverable error.
pub const ROUNDS_ABORTED: &str = "consensus_rounds_aborted_total";
/// Rounds in which a supermajority of peers reported another cloud hash.
pub const DIVERGENCE: &str = "consensus_divergence_total";
/// Peer calls that ended without a response.
pub const PEER_ABSTENTIONS: &str = "consensus_peer_abstentions_total";
/// Size of the committed active set (gauge).
pub const ACTIVE_NODES: &str = "consensus_active_nodes";

pub fn round_committed() {
    counter!(ROUNDS_COMMITTED).increment(1);
}

pub fn round_aborted() {
    counter!(ROUNDS_ABORTED).increment(1);
}

pub fn divergence() {
    counter!(DIVERGENCE).increment(1);
}

pub fn peer_abstained() {
    counter!(PEER_ABSTENTIONS).increment(1);
}

pub fn active_nodes(count: usize) {
    gauge!(ACTIVE_NODES).set(count as f64);
}
