use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::builder::EnvelopeBuilder;
use crate::error::NetworkError;
use crate::future::{CancelCallback, Future};
use crate::future_manager::FutureManager;
use crate::message::{Envelope, PayloadType};
use crate::ports::{Messenger, RequestHandler};

/// Returns `true` for envelopes that must be dropped.
pub type DropFilter = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// Process-local network: endpoints are addressed by string and every
/// request is delivered by calling the receiver's handler on its own task.
///
/// Requests to unregistered addresses, and envelopes matched by a drop
/// filter, vanish the way a lost packet would: the sender's future only
/// ends through its timeout.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn RequestHandler>>>>,
    filters: Arc<RwLock<Vec<DropFilter>>>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.into(), handler);
    }

    pub fn unregister(&self, address: &str) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address);
    }

    pub fn is_registered(&self, address: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(address)
    }

    pub fn add_drop_filter(&self, filter: DropFilter) {
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(filter);
    }

    pub fn clear_drop_filters(&self) {
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Creates the sending side for `address`.
    pub fn endpoint(&self, address: impl Into<String>) -> InMemoryEndpoint {
        InMemoryEndpoint {
            address: address.into(),
            network: self.clone(),
            futures: Arc::new(FutureManager::new()),
        }
    }

    fn dropped(&self, envelope: &Envelope) -> bool {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|filter| filter(envelope))
    }

    /// Delivers a request and returns the response, or `None` if either
    /// direction was lost.
    async fn deliver(&self, request: Envelope) -> Option<Envelope> {
        if self.dropped(&request) {
            debug!("dropped {} request {} -> {}", request.payload_type, request.sender, request.receiver);
            return None;
        }

        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.receiver)
            .cloned()?;

        let builder = EnvelopeBuilder::response_to(&request);
        let builder = match handler.handle(request).await {
            Ok(body) => builder.body(body),
            Err(e) => builder.error(e),
        };

        let response = match builder.build() {
            Ok(r) => r,
            Err(e) => {
                warn!("failed to build response: {}", e);
                return None;
            }
        };

        if self.dropped(&response) {
            debug!("dropped {} response {} -> {}", response.payload_type, response.sender, response.receiver);
            return None;
        }
        Some(response)
    }
}

impl fmt::Debug for InMemoryNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoints = self
            .handlers
            .read()
            .map(|h| h.len())
            .unwrap_or_default();
        f.debug_struct("InMemoryNetwork")
            .field("endpoints", &endpoints)
            .finish()
    }
}

/// A node's handle on the [`InMemoryNetwork`].
#[derive(Clone, Debug)]
pub struct InMemoryEndpoint {
    address: String,
    network: InMemoryNetwork,
    futures: Arc<FutureManager>,
}

impl InMemoryEndpoint {
    pub fn futures(&self) -> &FutureManager {
        &self.futures
    }

    fn build_request(&self, receiver: &str, payload_type: PayloadType, body: Vec<u8>) -> Result<Envelope, NetworkError> {
        EnvelopeBuilder::new(self.address.clone())
            .receiver(receiver)
            .request_id(self.futures.next_request_id())
            .payload_type(payload_type)
            .body(body)
            .build()
    }
}

#[async_trait]
impl Messenger for InMemoryEndpoint {
    fn local_address(&self) -> String {
        self.address.clone()
    }

    async fn send_request(
        &self,
        receiver: &str,
        payload_type: PayloadType,
        body: Vec<u8>,
        on_cancel: Option<CancelCallback>,
    ) -> Result<Arc<Future>, NetworkError> {
        let request = self.build_request(receiver, payload_type, body)?;
        let future = self.futures.create(request.clone(), on_cancel);

        let network = self.network.clone();
        let futures = Arc::clone(&self.futures);
        tokio::spawn(async move {
            if let Some(response) = network.deliver(request).await {
                futures.resolve(response);
            }
        });

        Ok(future)
    }

    async fn broadcast(
        &self,
        receivers: &[String],
        payload_type: PayloadType,
        body: Vec<u8>,
    ) -> Result<(), NetworkError> {
        let mut deliveries = Vec::with_capacity(receivers.len());
        for receiver in receivers {
            let request = self.build_request(receiver, payload_type, body.clone())?;
            deliveries.push(self.network.deliver(request));
        }
        let delivered = join_all(deliveries).await.into_iter().filter(Option::is_some).count();
        debug!("{} broadcast from {}: {}/{} delivered", payload_type, self.address, delivered, receivers.len());
        Ok(())
    }
}
