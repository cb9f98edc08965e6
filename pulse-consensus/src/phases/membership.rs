use std::time::Duration;

use pulse_common::NodeInfo;
use pulse_network::{decode, encode, Messenger, PayloadType};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConsensusError, Result};
use crate::registry::{consensus_address, NodeRegistry};

/// A discovery node's answer to a join request: its active set at the time
/// the claim was queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub active: Vec<NodeInfo>,
}

/// Sends the origin's signed join claim to `discovery` and adopts the
/// returned snapshot as the base of the next round.
///
/// The node stays `Waiting` until a round commits a set containing it.
pub async fn request_join(
    registry: &NodeRegistry,
    messenger: &dyn Messenger,
    discovery: &str,
    timeout: Duration,
) -> Result<usize> {
    let claim = registry.build_origin_join_claim().await?;
    let future = messenger
        .send_request(discovery, PayloadType::Join, encode(&claim)?, None)
        .await?;
    let response = future.await_result(timeout).await?;
    if let Some(reason) = response.error {
        return Err(ConsensusError::InvalidClaim(reason));
    }

    let snapshot: JoinResponse = decode(&response.body)?;
    let count = snapshot.active.len();
    registry.admin_insert(snapshot.active).await;
    info!(
        target: "consensus",
        "EVENT:JOIN_CLAIM node={} via={} snapshot={}",
        claim.node.reference(),
        discovery,
        count
    );
    Ok(count)
}

/// Announces a graceful stop to every other active member. Returns the
/// number of peers the claim was sent to.
pub async fn announce_leave(registry: &NodeRegistry, messenger: &dyn Messenger) -> Result<usize> {
    let claim = registry.build_origin_leave_claim().await?;
    let body = encode(&claim)?;

    let mut receivers = Vec::new();
    for node in registry.snapshot_active().await {
        if node.reference() == claim.node {
            continue;
        }
        receivers.push(consensus_address(node.address(), registry.port_offset())?);
    }

    messenger.broadcast(&receivers, PayloadType::Leave, body).await?;
    info!(target: "consensus", "EVENT:LEAVE_CLAIM node={} peers={}", claim.node, receivers.len());
    Ok(receivers.len())
}
