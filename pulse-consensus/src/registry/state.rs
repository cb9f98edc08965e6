use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the local node's membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeKeeperState {
    #[default]
    Undefined,
    /// Not admitted yet; waiting for a round that includes the origin.
    Waiting,
    /// Member of the agreed active set.
    Ready,
}

impl fmt::Display for NodeKeeperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKeeperState::Undefined => "undefined",
            NodeKeeperState::Waiting => "waiting",
            NodeKeeperState::Ready => "ready",
        };
        write!(f, "{}", s)
    }
}
