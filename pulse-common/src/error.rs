use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid node reference: {0}")]
    InvalidReference(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CommonError>;
