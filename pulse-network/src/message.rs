use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::NetworkError;

/// Correlation id of a request. Unique per endpoint for the life of the
/// process, not globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadType {
    /// Claim exchange.
    Phase1,
    /// Liveness bitset exchange.
    Phase2,
    /// Signed cloud hash exchange.
    Phase3,
    /// Join handshake with a discovery node.
    Join,
    /// Announcement of a graceful stop.
    Leave,
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayloadType::Phase1 => "phase1",
            PayloadType::Phase2 => "phase2",
            PayloadType::Phase3 => "phase3",
            PayloadType::Join => "join",
            PayloadType::Leave => "leave",
        };
        write!(f, "{}", s)
    }
}

/// Request/response envelope exchanged between endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub receiver: String,
    pub request_id: RequestId,
    pub payload_type: PayloadType,
    pub body: Vec<u8>,
    pub is_response: bool,
    pub error: Option<String>,
    pub trace_id: String,
}

impl Envelope {
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        decode(&self.body)
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, NetworkError> {
    bincode::serialize(value).map_err(|e| NetworkError::SerializationError(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, NetworkError> {
    bincode::deserialize(bytes).map_err(|e| NetworkError::SerializationError(e.to_string()))
}
