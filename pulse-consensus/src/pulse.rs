use std::time::Duration;

use pulse_common::Pulse;
use tokio::sync::{broadcast, oneshot, Mutex};
use tracing::{debug, info};

const CHANNEL_CAPACITY: usize = 16;

/// Local pulse source. Every tick carries a number `delta` above the
/// previous one.
///
/// Subscribers that fall behind lose the oldest pulses, never the newest.
pub struct Pulsar {
    interval: Duration,
    delta: u32,
    last: Mutex<Option<Pulse>>,
    sender: broadcast::Sender<Pulse>,
}

impl Pulsar {
    pub fn new(interval: Duration, delta: u32) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            interval,
            delta,
            last: Mutex::new(None),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Pulse> {
        self.sender.subscribe()
    }

    pub async fn last(&self) -> Option<Pulse> {
        *self.last.lock().await
    }

    /// Publishes `pulse` as is. Returns how many subscribers received it.
    pub async fn emit(&self, pulse: Pulse) -> usize {
        *self.last.lock().await = Some(pulse);
        let receivers = self.sender.send(pulse).unwrap_or(0);
        debug!("pulse {} (prev {}) sent to {} subscribers", pulse.number, pulse.prev_number, receivers);
        receivers
    }

    /// Publishes the successor of the last pulse, or the first pulse.
    pub async fn emit_next(&self) -> Pulse {
        let pulse = {
            let last = self.last.lock().await;
            match *last {
                Some(previous) => previous.next(self.delta),
                None => Pulse::first(),
            }
        };
        self.emit(pulse).await;
        pulse
    }

    /// Emits a pulse every interval until `stop` fires or its sender is
    /// dropped.
    pub async fn run(&self, mut stop: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("pulsar started, interval {:?}, delta {}", self.interval, self.delta);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.emit_next().await;
                }
                _ = &mut stop => break,
            }
        }
        info!("pulsar stopped");
    }
}
