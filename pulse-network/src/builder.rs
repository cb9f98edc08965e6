use uuid::Uuid;

use crate::error::NetworkError;
use crate::message::{Envelope, PayloadType, RequestId};

/// Accumulates envelope fields as plain data; `build` validates and
/// assembles them. Cloning a builder is how a partially filled template is
/// reused.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    sender: String,
    receiver: Option<String>,
    request_id: Option<RequestId>,
    payload_type: Option<PayloadType>,
    body: Vec<u8>,
    is_response: bool,
    error: Option<String>,
    trace_id: Option<String>,
}

impl EnvelopeBuilder {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            ..Self::default()
        }
    }

    /// Pre-fills a response to `request`: swapped endpoints, same request
    /// id, payload type and trace id.
    pub fn response_to(request: &Envelope) -> Self {
        Self {
            sender: request.receiver.clone(),
            receiver: Some(request.sender.clone()),
            request_id: Some(request.request_id),
            payload_type: Some(request.payload_type),
            body: Vec::new(),
            is_response: true,
            error: None,
            trace_id: Some(request.trace_id.clone()),
        }
    }

    pub fn receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn payload_type(mut self, payload_type: PayloadType) -> Self {
        self.payload_type = Some(payload_type);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn response(mut self, is_response: bool) -> Self {
        self.is_response = is_response;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// A fresh trace id is generated when none was set.
    pub fn build(self) -> Result<Envelope, NetworkError> {
        Ok(Envelope {
            sender: self.sender,
            receiver: self.receiver.ok_or(NetworkError::MissingField("receiver"))?,
            request_id: self.request_id.ok_or(NetworkError::MissingField("request_id"))?,
            payload_type: self.payload_type.ok_or(NetworkError::MissingField("payload_type"))?,
            body: self.body,
            is_response: self.is_response,
            error: self.error,
            trace_id: self.trace_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        })
    }
}
