use std::sync::Arc;

use pulse_common::Pulse;
use pulse_consensus::{PhaseExecutor, RoundOutcome, ShutdownSupervisor};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Rounds a driver went through before it stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriverSummary {
    pub committed: usize,
    pub aborted: usize,
    pub skipped_pulses: u64,
    pub fatal: bool,
}

/// Feeds pulses to one node's executor, one round at a time.
///
/// A pulse that arrives while a round is still running waits in the
/// channel; when the channel overflows the oldest pulses are skipped.
pub struct PulseDriver {
    executor: Arc<PhaseExecutor>,
    supervisor: Arc<ShutdownSupervisor>,
}

impl PulseDriver {
    pub fn new(executor: Arc<PhaseExecutor>, supervisor: Arc<ShutdownSupervisor>) -> Self {
        Self { executor, supervisor }
    }

    /// Runs until `limit` rounds were attempted (`None`: no limit), the
    /// pulse source closes, or a fatal error hands control to the
    /// supervisor.
    pub async fn run(&self, mut pulses: broadcast::Receiver<Pulse>, limit: Option<usize>) -> DriverSummary {
        let mut summary = DriverSummary::default();

        loop {
            if limit.is_some_and(|l| summary.committed + summary.aborted >= l) {
                break;
            }

            let pulse = match pulses.recv().await {
                Ok(pulse) => pulse,
                Err(RecvError::Lagged(missed)) => {
                    warn!("driver fell behind, skipping {} pulses", missed);
                    summary.skipped_pulses += missed;
                    continue;
                }
                Err(RecvError::Closed) => {
                    debug!("pulse source closed");
                    break;
                }
            };

            match self.executor.run_round(&pulse).await {
                Ok(RoundOutcome::Committed(report)) => {
                    summary.committed += 1;
                    debug!("pulse {} committed with {} members", report.pulse, report.active_after);
                }
                Ok(RoundOutcome::Aborted { pulse, phase, reason }) => {
                    summary.aborted += 1;
                    debug!("pulse {} aborted in {}: {}", pulse, phase, reason);
                }
                Err(fatal) => {
                    summary.fatal = true;
                    self.supervisor.abort(Some(pulse.number), fatal).await;
                    break;
                }
            }
        }

        info!(
            "driver stopped: {} committed, {} aborted, {} skipped",
            summary.committed, summary.aborted, summary.skipped_pulses
        );
        summary
    }
}
