use std::collections::VecDeque;

use tokio::sync::Mutex;

use super::Claim;

/// Process-local FIFO of claims awaiting the next round.
#[derive(Debug, Default)]
pub struct ClaimQueue {
    claims: Mutex<VecDeque<Claim>>,
}

impl ClaimQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, claim: Claim) {
        self.claims.lock().await.push_back(claim);
    }

    /// Takes every queued claim, oldest first.
    pub async fn drain(&self) -> Vec<Claim> {
        self.claims.lock().await.drain(..).collect()
    }

    /// Puts claims taken by an aborted round back in front of anything
    /// queued since, keeping their order.
    pub async fn restore(&self, claims: Vec<Claim>) {
        let mut queue = self.claims.lock().await;
        for claim in claims.into_iter().rev() {
            queue.push_front(claim);
        }
    }

    pub async fn clear(&self) {
        self.claims.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.claims.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.claims.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::LeaveClaim;
    use pulse_common::NodeReference;

    fn leave(b: u8) -> Claim {
        let mut bytes = [0u8; 32];
        bytes[0] = b;
        Claim::Leave(LeaveClaim {
            node: NodeReference::new(bytes),
            signature: vec![],
        })
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = ClaimQueue::new();
        queue.push(leave(1)).await;
        queue.push(leave(2)).await;
        queue.push(leave(3)).await;

        assert_eq!(queue.drain().await, vec![leave(1), leave(2), leave(3)]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_restore_goes_in_front() {
        let queue = ClaimQueue::new();
        queue.push(leave(1)).await;
        queue.push(leave(2)).await;
        let taken = queue.drain().await;

        queue.push(leave(3)).await;
        queue.restore(taken).await;

        assert_eq!(queue.drain().await, vec![leave(1), leave(2), leave(3)]);
    }
}
