use std::sync::Arc;

use pulse_common::auth::Authenticator;
use pulse_common::NodeInfo;
use pulse_consensus::{
    announce_leave, consensus_address, request_join, ConsensusHandler, NodeRegistry, PhaseExecutor, RoundInbox,
    ShutdownReason, ShutdownSupervisor,
};
use pulse_network::{InMemoryEndpoint, InMemoryNetwork};
use tokio::sync::{oneshot, RwLock};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{NodeError, Result};

/// Everything one node runs with, wired together.
pub struct PulseRuntime {
    pub config: Config,
    pub origin: NodeInfo,
    pub registry: Arc<NodeRegistry>,
    pub executor: Arc<PhaseExecutor>,
    pub supervisor: Arc<ShutdownSupervisor>,
    pub consensus_address: String,
    network: InMemoryNetwork,
    messenger: Arc<InMemoryEndpoint>,
}

impl PulseRuntime {
    /// Runs the join handshake against the configured discovery nodes,
    /// first success wins. Discovery nodes skip it.
    pub async fn join(&self) -> Result<usize> {
        if self.config.is_discovery {
            return Ok(self.registry.active_count().await);
        }

        for discovery in &self.config.discovery {
            match request_join(
                &self.registry,
                self.messenger.as_ref(),
                discovery,
                self.config.consensus.phase_timeout(),
            )
            .await
            {
                Ok(count) => {
                    info!("{} joined via {} ({} known members)", self.config.node_name, discovery, count);
                    return Ok(count);
                }
                Err(e) => warn!("join via {} failed: {}", discovery, e),
            }
        }
        Err(NodeError::JoinFailed)
    }

    /// Announces a graceful stop and takes the node off the network.
    pub async fn leave(&self) -> Result<()> {
        let peers = announce_leave(&self.registry, self.messenger.as_ref()).await?;
        self.network.unregister(&self.consensus_address);
        self.network.unregister(self.origin.address());
        info!("{} left, {} peers notified", self.config.node_name, peers);
        Ok(())
    }
}

/// Composition root of a node: builds the registry, the inbound handler and
/// the phase executor around `auth` and registers the node on `network`.
///
/// The handler listens on the consensus address for rounds and on the
/// declared address for join requests. The returned receiver yields the
/// first fatal error.
pub async fn build_runtime(
    config: Config,
    auth: Arc<RwLock<dyn Authenticator>>,
    network: &InMemoryNetwork,
) -> Result<(PulseRuntime, oneshot::Receiver<ShutdownReason>)> {
    let public_key = auth.read().await.public_key();
    let origin = NodeInfo::from_public_key(public_key, config.role, config.address.clone(), config.version.clone());
    let offset = config.consensus.consensus_port_offset;
    let consensus_addr = consensus_address(origin.address(), offset)?;

    let registry = Arc::new(NodeRegistry::new(origin.clone(), Arc::clone(&auth), offset));
    registry.initialize(config.is_discovery).await;

    let inbox = Arc::new(RoundInbox::new(config.consensus.pulse_delta));
    let handler = Arc::new(ConsensusHandler::new(
        Arc::clone(&registry),
        Arc::clone(&inbox),
        Arc::clone(&auth),
        config.consensus.phase_timeout(),
    ));
    network.register(consensus_addr.clone(), handler.clone());
    network.register(origin.address(), handler);

    let messenger = Arc::new(network.endpoint(consensus_addr.clone()));
    let executor = Arc::new(PhaseExecutor::new(
        Arc::clone(&registry),
        messenger.clone(),
        auth,
        inbox,
        config.consensus.clone(),
    ));

    let (supervisor, shutdown_rx) = ShutdownSupervisor::channel();
    info!(
        "built {} ({}) at {}, consensus at {}",
        config.node_name,
        origin.reference(),
        origin.address(),
        consensus_addr
    );

    let runtime = PulseRuntime {
        config,
        origin,
        registry,
        executor,
        supervisor: Arc::new(supervisor),
        consensus_address: consensus_addr,
        network: network.clone(),
        messenger,
    };
    Ok((runtime, shutdown_rx))
}
