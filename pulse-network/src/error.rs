use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Failed to send message to {0}")]
    SendError(String),
    #[error("Peer {0} not found")]
    PeerNotFound(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Envelope is missing field `{0}`")]
    MissingField(&'static str),
}

/// Terminal failures of a [`crate::Future`].
///
/// `Cancelled` and `Timeout` are expected during a round and count as the
/// peer abstaining. `AlreadyConsumed` is a contract violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FutureError {
    #[error("future was cancelled")]
    Cancelled,
    #[error("wait expired after {0:?}")]
    Timeout(std::time::Duration),
    #[error("future result already consumed")]
    AlreadyConsumed,
}
