use pulse_common::CommonError;
use pulse_consensus::ConsensusError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("config serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error("no discovery node admitted the join request")]
    JoinFailed,
}

pub type Result<T> = std::result::Result<T, NodeError>;
