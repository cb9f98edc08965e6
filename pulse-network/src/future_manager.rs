use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

use crate::future::{CancelCallback, Future};
use crate::message::{Envelope, RequestId};

type FutureMap = Mutex<HashMap<RequestId, Arc<Future>>>;

/// Tracks the outstanding futures of one endpoint by request id.
///
/// A future leaves the map when its response is routed to it or when it is
/// cancelled, whichever happens first.
#[derive(Debug, Default)]
pub struct FutureManager {
    futures: Arc<FutureMap>,
    next_id: AtomicU64,
}

impl FutureManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_request_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Registers a future for `request`. `on_cancel` runs after the future
    /// has been removed from the manager.
    pub fn create(&self, request: Envelope, on_cancel: Option<CancelCallback>) -> Arc<Future> {
        let id = request.request_id;
        let receiver = request.receiver.clone();
        let futures: Weak<FutureMap> = Arc::downgrade(&self.futures);

        let callback: CancelCallback = Box::new(move |future: &Future| {
            if let Some(futures) = futures.upgrade() {
                futures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&future.id());
            }
            if let Some(on_cancel) = on_cancel {
                on_cancel(future);
            }
        });

        let future = Arc::new(Future::new(id, receiver, request, Some(callback)));
        self.futures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&future));
        future
    }

    pub fn get(&self, id: RequestId) -> Option<Arc<Future>> {
        self.futures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Routes a response to its future. Responses for unknown ids (already
    /// cancelled, or never issued) and responses from an endpoint other than
    /// the one the request went to are dropped.
    pub fn resolve(&self, response: Envelope) -> bool {
        let future = {
            let mut futures = self.futures.lock().unwrap_or_else(PoisonError::into_inner);
            match futures.get(&response.request_id) {
                Some(f) if f.receiver() == response.sender => futures.remove(&response.request_id),
                _ => None,
            }
        };

        match future {
            Some(future) => future.fulfill(response),
            None => {
                debug!(
                    "dropping response {} from {}: no matching future",
                    response.request_id, response.sender
                );
                false
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.futures.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EnvelopeBuilder;
    use crate::message::PayloadType;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn request(manager: &FutureManager, to: &str) -> Envelope {
        EnvelopeBuilder::new("me")
            .receiver(to)
            .request_id(manager.next_request_id())
            .payload_type(PayloadType::Phase2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_ids_are_unique() {
        let manager = FutureManager::new();
        let a = manager.next_request_id();
        let b = manager.next_request_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_resolve_routes_response() {
        let manager = FutureManager::new();
        let req = request(&manager, "peer");
        let future = manager.create(req.clone(), None);
        assert_eq!(manager.pending(), 1);

        let response = EnvelopeBuilder::response_to(&req).body(vec![3]).build().unwrap();
        assert!(manager.resolve(response));
        assert_eq!(manager.pending(), 0);

        let result = future.await_result(Duration::from_millis(10)).await.unwrap();
        assert_eq!(result.body, vec![3]);
    }

    #[test]
    fn test_resolve_rejects_wrong_sender() {
        let manager = FutureManager::new();
        let req = request(&manager, "peer");
        manager.create(req.clone(), None);

        let mut response = EnvelopeBuilder::response_to(&req).build().unwrap();
        response.sender = "impostor".to_string();
        assert!(!manager.resolve(response));
        assert_eq!(manager.pending(), 1);
    }

    #[tokio::test]
    async fn test_cancel_removes_and_calls_back() {
        let manager = FutureManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_cb = Arc::clone(&calls);

        let req = request(&manager, "peer");
        let future = manager.create(
            req.clone(),
            Some(Box::new(move |_f: &Future| {
                calls_cb.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })),
        );

        assert!(future.await_result(Duration::from_millis(5)).await.is_err());
        assert_eq!(manager.pending(), 0);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        // A late response finds nothing to resolve.
        let late = EnvelopeBuilder::response_to(&req).build().unwrap();
        assert!(!manager.resolve(late));
    }
}
