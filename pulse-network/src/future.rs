use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::FutureError;
use crate::message::{Envelope, RequestId};

const PENDING: u8 = 0;
const FULFILLED: u8 = 1;
const CANCELLED: u8 = 2;

/// Invoked exactly once, and only when a future ends cancelled.
pub type CancelCallback = Box<dyn FnOnce(&Future) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Fulfilled,
    Cancelled,
}

/// One outstanding request waiting for its response.
///
/// The terminal outcome is decided by a single compare-and-swap out of
/// `Pending`: whichever of [`Future::fulfill`] and [`Future::cancel`] wins
/// sets it, the loser is a no-op. The result can be taken once.
pub struct Future {
    id: RequestId,
    receiver: String,
    request: Envelope,
    state: AtomicU8,
    result_tx: Mutex<Option<oneshot::Sender<Envelope>>>,
    result_rx: Mutex<Option<oneshot::Receiver<Envelope>>>,
    cancel_callback: Mutex<Option<CancelCallback>>,
}

impl Future {
    pub fn new(
        id: RequestId,
        receiver: impl Into<String>,
        request: Envelope,
        cancel_callback: Option<CancelCallback>,
    ) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            id,
            receiver: receiver.into(),
            request,
            state: AtomicU8::new(PENDING),
            result_tx: Mutex::new(Some(tx)),
            result_rx: Mutex::new(Some(rx)),
            cancel_callback: Mutex::new(cancel_callback),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn request(&self) -> &Envelope {
        &self.request
    }

    pub fn state(&self) -> FutureState {
        match self.state.load(Ordering::Acquire) {
            PENDING => FutureState::Pending,
            FULFILLED => FutureState::Fulfilled,
            _ => FutureState::Cancelled,
        }
    }

    /// Delivers the response. Returns `false` if the future already ended.
    pub fn fulfill(&self, result: Envelope) -> bool {
        if self
            .state
            .compare_exchange(PENDING, FULFILLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let tx = self
            .result_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = tx {
            // The receiver may already be gone if nobody waits anymore.
            let _ = tx.send(result);
        }
        // A fulfilled future never runs the cancel path.
        self.cancel_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        true
    }

    /// Cancels the future and runs the cancel callback. Safe to call any
    /// number of times from any task; only the first call on a pending
    /// future has an effect.
    pub fn cancel(&self) -> bool {
        if self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Dropping the sender wakes a waiting `await_result`.
        self.result_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let callback = self
            .cancel_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback(self);
        }
        true
    }

    /// Waits for the response for at most `timeout`.
    ///
    /// On expiry the future is cancelled (running the callback) and
    /// `FutureError::Timeout` is returned, unless a response won the race in
    /// the meantime, in which case that response is returned. A second call
    /// fails with `FutureError::AlreadyConsumed`.
    pub async fn await_result(&self, timeout: Duration) -> Result<Envelope, FutureError> {
        let rx = self
            .result_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut rx = rx.ok_or(FutureError::AlreadyConsumed)?;

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(FutureError::Cancelled),
            Err(_) => {
                if self.cancel() {
                    return Err(FutureError::Timeout(timeout));
                }
                match self.state() {
                    // The winning `fulfill` is about to send; wait for it.
                    FutureState::Fulfilled => rx.await.map_err(|_| FutureError::Cancelled),
                    _ => Err(FutureError::Cancelled),
                }
            }
        }
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.id)
            .field("receiver", &self.receiver)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EnvelopeBuilder;
    use crate::message::PayloadType;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn request() -> Envelope {
        EnvelopeBuilder::new("127.0.0.1:8080")
            .receiver("127.0.0.1:8081")
            .request_id(RequestId(1))
            .payload_type(PayloadType::Phase1)
            .build()
            .unwrap()
    }

    fn response(body: Vec<u8>) -> Envelope {
        EnvelopeBuilder::response_to(&request()).body(body).build().unwrap()
    }

    fn counting_callback(counter: &Arc<AtomicUsize>) -> Option<CancelCallback> {
        let counter = Arc::clone(counter);
        Some(Box::new(move |_f: &Future| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_accessors() {
        let req = request();
        let f = Future::new(RequestId(1), "127.0.0.1:8081", req.clone(), None);
        assert_eq!(f.id(), RequestId(1));
        assert_eq!(f.receiver(), "127.0.0.1:8081");
        assert_eq!(f.request(), &req);
        assert_eq!(f.state(), FutureState::Pending);
    }

    #[tokio::test]
    async fn test_fulfill_then_await() {
        let f = Future::new(RequestId(1), "peer", request(), None);
        assert!(f.fulfill(response(vec![42])));

        let result = f.await_result(Duration::from_millis(10)).await.unwrap();
        assert_eq!(result.body, vec![42]);
        assert_eq!(f.state(), FutureState::Fulfilled);
    }

    #[tokio::test]
    async fn test_second_read_fails_already_consumed() {
        let f = Future::new(RequestId(1), "peer", request(), None);
        f.fulfill(response(vec![1]));

        assert!(f.await_result(Duration::from_millis(10)).await.is_ok());
        let second = f.await_result(Duration::from_millis(10)).await;
        assert_eq!(second.unwrap_err(), FutureError::AlreadyConsumed);
    }

    #[tokio::test]
    async fn test_cancel_after_fulfill_is_noop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let f = Future::new(RequestId(1), "peer", request(), counting_callback(&counter));

        assert!(f.fulfill(response(vec![7])));
        assert!(!f.cancel());
        assert!(!f.cancel());

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let result = f.await_result(Duration::from_millis(10)).await.unwrap();
        assert_eq!(result.body, vec![7]);
    }

    #[tokio::test]
    async fn test_cancel_runs_callback_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let f = Future::new(RequestId(1), "peer", request(), counting_callback(&counter));

        assert!(f.cancel());
        assert!(!f.cancel());
        assert!(!f.fulfill(response(vec![1])));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(
            f.await_result(Duration::from_millis(10)).await.unwrap_err(),
            FutureError::Cancelled
        );
    }

    #[tokio::test]
    async fn test_await_times_out_and_cancels_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let f = Future::new(RequestId(1), "peer", request(), counting_callback(&counter));

        let err = f.await_result(Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err, FutureError::Timeout(Duration::from_millis(10)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(f.state(), FutureState::Cancelled);

        f.cancel();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let counter = Arc::new(AtomicUsize::new(0));
        let f = Arc::new(Future::new(RequestId(1), "peer", request(), counting_callback(&counter)));

        let canceller = Arc::clone(&f);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            canceller.cancel();
        });

        let err = f.await_result(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err, FutureError::Cancelled);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fulfill_cancel_race_has_single_winner() {
        for _ in 0..200 {
            let counter = Arc::new(AtomicUsize::new(0));
            let f = Arc::new(Future::new(RequestId(1), "peer", request(), counting_callback(&counter)));

            let a = Arc::clone(&f);
            let b = Arc::clone(&f);
            let cancel = tokio::spawn(async move { a.cancel() });
            let fulfill = tokio::spawn(async move { b.fulfill(response(vec![9])) });

            let cancelled = cancel.await.unwrap();
            let fulfilled = fulfill.await.unwrap();
            assert!(cancelled ^ fulfilled, "exactly one transition must win");

            let result = f.await_result(Duration::from_millis(10)).await;
            if fulfilled {
                assert_eq!(result.unwrap().body, vec![9]);
                assert_eq!(counter.load(Ordering::SeqCst), 0);
            } else {
                assert_eq!(result.unwrap_err(), FutureError::Cancelled);
                assert_eq!(counter.load(Ordering::SeqCst), 1);
            }
        }
    }
}
