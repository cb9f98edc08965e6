use pulse_common::{CommonError, NodeReference};
use pulse_network::{FutureError, NetworkError};
use thiserror::Error;

use crate::phases::RoundPhase;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("origin {0} is absent from the round's bitset mapper")]
    MapperLookup(NodeReference),

    #[error("quorum not reached in {phase}: {respondents} of {expected} responded, {required} required")]
    QuorumNotReached {
        phase: RoundPhase,
        respondents: usize,
        expected: usize,
        required: usize,
    },

    #[error("origin {0} was excluded from the active set")]
    SelfExcluded(NodeReference),

    #[error("origin {0} has not been admitted yet")]
    NotAdmitted(NodeReference),

    #[error(transparent)]
    Future(#[from] FutureError),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid claim: {0}")]
    InvalidClaim(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl ConsensusError {
    /// Local faults that end this node's participation. Everything else is
    /// absorbed as an abstention or an aborted round.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConsensusError::Signing(_)
                | ConsensusError::MapperLookup(_)
                | ConsensusError::SelfExcluded(_)
        )
    }
}

impl From<CommonError> for ConsensusError {
    fn from(e: CommonError) -> Self {
        match e {
            CommonError::Signing(msg) => ConsensusError::Signing(msg),
            CommonError::Serialization(msg) => ConsensusError::Codec(msg),
            other => ConsensusError::InvalidClaim(other.to_string()),
        }
    }
}

impl From<bincode::Error> for ConsensusError {
    fn from(e: bincode::Error) -> Self {
        ConsensusError::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
