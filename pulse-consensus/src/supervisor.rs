use pulse_common::PulseNumber;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, warn};

use crate::error::ConsensusError;

/// Why the node stopped taking part in consensus.
#[derive(Debug)]
pub struct ShutdownReason {
    pub pulse: Option<PulseNumber>,
    pub error: ConsensusError,
}

/// Receives the first fatal error of the node and hands it to whoever owns
/// the shutdown side. Later reports are logged and dropped.
pub struct ShutdownSupervisor {
    sender: Mutex<Option<oneshot::Sender<ShutdownReason>>>,
}

impl ShutdownSupervisor {
    pub fn channel() -> (Self, oneshot::Receiver<ShutdownReason>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Returns `true` if this was the first report.
    pub async fn abort(&self, pulse: Option<PulseNumber>, error: ConsensusError) -> bool {
        let Some(sender) = self.sender.lock().await.take() else {
            warn!("shutdown already requested, ignoring: {}", error);
            return false;
        };

        let pulse_label = pulse.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        error!(target: "consensus", "EVENT:FATAL pulse={} reason={}", pulse_label, error);
        if sender.send(ShutdownReason { pulse, error }).is_err() {
            warn!("shutdown receiver dropped before the fatal error arrived");
        }
        true
    }

    pub async fn is_aborted(&self) -> bool {
        self.sender.lock().await.is_none()
    }
}
