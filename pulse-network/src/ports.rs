use std::sync::Arc;

use async_trait::async_trait;

use crate::error::NetworkError;
use crate::future::{CancelCallback, Future};
use crate::message::{Envelope, PayloadType};

/// Messaging capability consumed by the consensus layer.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Address other endpoints reach this one at.
    fn local_address(&self) -> String;

    /// Unicast request. The returned future completes with the peer's
    /// response; `on_cancel` runs if it is cancelled or times out instead.
    async fn send_request(
        &self,
        receiver: &str,
        payload_type: PayloadType,
        body: Vec<u8>,
        on_cancel: Option<CancelCallback>,
    ) -> Result<Arc<Future>, NetworkError>;

    /// Cascade send to a set of peers. Responses are ignored.
    async fn broadcast(
        &self,
        receivers: &[String],
        payload_type: PayloadType,
        body: Vec<u8>,
    ) -> Result<(), NetworkError>;
}

/// Inbound side of an endpoint. Returns the response body, or an error
/// string carried back in the response envelope.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Envelope) -> Result<Vec<u8>, String>;
}
