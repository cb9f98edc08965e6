use std::collections::BTreeMap;
use std::time::Duration;

use pulse_common::{NodeReference, PulseNumber};
use tokio::sync::{watch, Mutex};

use super::packets::PhasePacket;
use super::RoundPhase;

#[derive(Debug, Default)]
struct PhaseSlot {
    local: Option<PhasePacket>,
    received: BTreeMap<NodeReference, PhasePacket>,
}

/// Distinct pulses a node that has not started any round will hold packets
/// for.
const UNSTARTED_PULSE_LIMIT: usize = 2;

#[derive(Debug, Default)]
struct InboxState {
    current: Option<PulseNumber>,
    slots: BTreeMap<(PulseNumber, RoundPhase), PhaseSlot>,
    addresses: BTreeMap<(PulseNumber, NodeReference), String>,
}

impl InboxState {
    fn admits(&self, pulse: PulseNumber, horizon: u32) -> bool {
        match self.current {
            Some(current) => pulse >= current && pulse.0 <= current.0.saturating_add(horizon),
            None => {
                let mut tracked: Vec<PulseNumber> = self.slots.keys().map(|(p, _)| *p).collect();
                tracked.dedup();
                tracked.contains(&pulse) || tracked.len() < UNSTARTED_PULSE_LIMIT
            }
        }
    }
}

/// Packets of the running round, shared by the executor and the inbound
/// handler.
///
/// The executor publishes its own packet of each phase here; the handler
/// records what peers sent and answers each request with the local packet
/// of the same phase, waiting for it if the local round is behind.
///
/// Peer packets are only kept for the current pulse and up to `horizon`
/// pulse numbers ahead of it.
#[derive(Debug)]
pub struct RoundInbox {
    state: Mutex<InboxState>,
    changed: watch::Sender<u64>,
    horizon: u32,
}

impl RoundInbox {
    pub fn new(horizon: u32) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            state: Mutex::new(InboxState::default()),
            changed,
            horizon,
        }
    }

    /// Starts the round of `pulse`, discarding everything older and
    /// everything beyond the horizon.
    pub async fn begin(&self, pulse: PulseNumber) {
        let limit = pulse.0.saturating_add(self.horizon);
        let mut state = self.state.lock().await;
        state.current = Some(pulse);
        state.slots.retain(|(p, _), _| *p >= pulse && p.0 <= limit);
        state.addresses.retain(|(p, _), _| *p >= pulse && p.0 <= limit);
    }

    pub async fn current(&self) -> Option<PulseNumber> {
        self.state.lock().await.current
    }

    pub async fn set_local(&self, packet: PhasePacket) {
        {
            let key = (packet.pulse(), packet.phase());
            let mut state = self.state.lock().await;
            state.slots.entry(key).or_default().local = Some(packet);
        }
        self.changed.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Records a peer's packet. Packets of finished rounds, packets too far
    /// ahead and repeats from the same sender are ignored.
    pub async fn record(&self, packet: PhasePacket) -> bool {
        let mut state = self.state.lock().await;
        if !state.admits(packet.pulse(), self.horizon) {
            return false;
        }
        let slot = state.slots.entry((packet.pulse(), packet.phase())).or_default();
        if slot.received.contains_key(&packet.sender()) {
            return false;
        }
        slot.received.insert(packet.sender(), packet);
        true
    }

    /// Remembers the consensus address a newcomer declared in its Phase 1
    /// claim, so later phases from it can be checked.
    pub async fn remember_address(&self, pulse: PulseNumber, sender: NodeReference, address: String) {
        let mut state = self.state.lock().await;
        if state.admits(pulse, self.horizon) {
            state.addresses.insert((pulse, sender), address);
        }
    }

    pub async fn remembered_address(&self, pulse: PulseNumber, sender: &NodeReference) -> Option<String> {
        self.state.lock().await.addresses.get(&(pulse, *sender)).cloned()
    }

    pub async fn received(&self, pulse: PulseNumber, phase: RoundPhase) -> BTreeMap<NodeReference, PhasePacket> {
        self.state
            .lock()
            .await
            .slots
            .get(&(pulse, phase))
            .map(|slot| slot.received.clone())
            .unwrap_or_default()
    }

    pub async fn local(&self, pulse: PulseNumber, phase: RoundPhase) -> Option<PhasePacket> {
        self.state
            .lock()
            .await
            .slots
            .get(&(pulse, phase))
            .and_then(|slot| slot.local.clone())
    }

    /// Waits up to `timeout` for the local packet of `phase` in `pulse`.
    pub async fn wait_local(&self, pulse: PulseNumber, phase: RoundPhase, timeout: Duration) -> Option<PhasePacket> {
        let mut changes = self.changed.subscribe();
        let wait = async {
            loop {
                if let Some(packet) = self.local(pulse, phase).await {
                    return Some(packet);
                }
                if changes.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}
