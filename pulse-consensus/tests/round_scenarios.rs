use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pulse_common::auth::ed25519::Ed25519Authenticator;
use pulse_common::auth::Authenticator;
use pulse_common::{NodeInfo, Pulse, StaticRole};
use pulse_consensus::{
    announce_leave, consensus_address, Claim, ConsensusConfig, ConsensusError, ConsensusHandler, JoinClaim,
    NodeKeeperState, NodeRegistry, PhaseExecutor, RoundInbox, RoundOutcome, RoundPhase,
};
use pulse_network::{Envelope, InMemoryEndpoint, InMemoryNetwork, PayloadType};
use tokio::sync::RwLock;

struct TestNode {
    info: NodeInfo,
    registry: Arc<NodeRegistry>,
    executor: PhaseExecutor,
    endpoint: InMemoryEndpoint,
    consensus_addr: String,
}

fn config() -> ConsensusConfig {
    ConsensusConfig {
        phase_timeout_ms: 200,
        ..ConsensusConfig::default()
    }
}

async fn spawn_node(network: &InMemoryNetwork, index: u8, discovery: bool) -> TestNode {
    let config = config();
    let address = format!("127.0.0.1:{}", 9000 + u16::from(index) * 10);
    let consensus_addr = consensus_address(&address, config.consensus_port_offset).unwrap();

    let signer = Ed25519Authenticator::from_bytes(&[index + 1; 32]).unwrap();
    let info = NodeInfo::from_public_key(signer.public_key(), StaticRole::Virtual, address, "0.1.0");
    let auth: Arc<RwLock<dyn Authenticator>> = Arc::new(RwLock::new(signer));

    let registry = Arc::new(NodeRegistry::new(
        info.clone(),
        Arc::clone(&auth),
        config.consensus_port_offset,
    ));
    registry.initialize(discovery).await;

    let inbox = Arc::new(RoundInbox::new(config.pulse_delta));
    network.register(
        consensus_addr.clone(),
        Arc::new(ConsensusHandler::new(
            Arc::clone(&registry),
            Arc::clone(&inbox),
            Arc::clone(&auth),
            config.phase_timeout(),
        )),
    );

    let endpoint = network.endpoint(consensus_addr.clone());
    let executor = PhaseExecutor::new(
        Arc::clone(&registry),
        Arc::new(endpoint.clone()),
        auth,
        inbox,
        config,
    );

    TestNode {
        info,
        registry,
        executor,
        endpoint,
        consensus_addr,
    }
}

/// `size` nodes that all start out Ready with the full set.
async fn bootstrap(network: &InMemoryNetwork, size: u8) -> Vec<TestNode> {
    let mut nodes = Vec::new();
    for i in 0..size {
        nodes.push(spawn_node(network, i, true).await);
    }
    let infos: Vec<NodeInfo> = nodes.iter().map(|n| n.info.clone()).collect();
    for node in &nodes {
        node.registry.admin_insert(infos.clone()).await;
    }
    nodes
}

async fn run_round(nodes: &[&TestNode], pulse: &Pulse) -> Vec<RoundOutcome> {
    join_all(nodes.iter().map(|n| n.executor.run_round(pulse)))
        .await
        .into_iter()
        .map(|outcome| outcome.expect("no fatal error"))
        .collect()
}

fn isolate(network: &InMemoryNetwork, address: &str) {
    let address = address.to_string();
    network.add_drop_filter(Arc::new(move |e: &Envelope| e.sender == address || e.receiver == address));
}

#[tokio::test]
async fn test_full_participation_keeps_everyone() {
    let network = InMemoryNetwork::new();
    let nodes = bootstrap(&network, 5).await;
    let all: Vec<&TestNode> = nodes.iter().collect();

    let outcomes = run_round(&all, &Pulse::first()).await;

    let first = outcomes[0].report().expect("committed");
    for outcome in &outcomes {
        let report = outcome.report().expect("committed");
        assert_eq!(report.active_after, 5);
        assert!(!report.nodes_joined_during_previous_pulse);
        assert!(!report.divergence);
        assert!(report.abstentions.is_empty());
        assert_eq!(report.cloud_hash, first.cloud_hash);
    }
    for node in &nodes {
        assert_eq!(node.registry.active_count().await, 5);
        assert_eq!(node.registry.state().await, NodeKeeperState::Ready);
        assert_eq!(node.registry.cloud_hash().await, Some(first.cloud_hash));
        assert!(node.registry.resolve_consensus(&node.info.reference()).await.is_none());
        assert_eq!(node.endpoint.futures().pending(), 0);
    }
}

#[tokio::test]
async fn test_queued_join_claim_admits_newcomer() {
    let network = InMemoryNetwork::new();
    let nodes = bootstrap(&network, 5).await;

    let joiner = spawn_node(&network, 5, false).await;
    joiner.registry.admin_insert(nodes[0].registry.snapshot_active().await).await;

    let signer = Ed25519Authenticator::from_bytes(&[6; 32]).unwrap();
    let claim = JoinClaim::sign(joiner.info.clone(), &signer).unwrap();
    nodes[0].registry.claim_queue().push(Claim::Join(claim)).await;

    let mut all: Vec<&TestNode> = nodes.iter().collect();
    all.push(&joiner);
    let outcomes = run_round(&all, &Pulse::first()).await;

    for outcome in &outcomes {
        let report = outcome.report().expect("committed");
        assert_eq!(report.active_after, 6);
        assert!(report.nodes_joined_during_previous_pulse);
    }
    assert_eq!(joiner.registry.state().await, NodeKeeperState::Ready);
    assert!(joiner.registry.active_node(&joiner.info.reference()).await.is_some());
    assert!(nodes[0].registry.claim_queue().is_empty().await);
    assert!(nodes[3].registry.nodes_joined_during_previous_pulse().await);
}

#[tokio::test]
async fn test_sixty_percent_silent_round_commits_without_silent_nodes() {
    for size in [5u8, 7, 10, 12] {
        let network = InMemoryNetwork::new();
        let nodes = bootstrap(&network, size).await;

        // int(0.6 * (size - 1)) peers of the first node go silent.
        let silent = (usize::from(size) - 1) * 3 / 5;
        let remaining = nodes.len() - silent;
        for node in &nodes[remaining..] {
            isolate(&network, &node.consensus_addr);
        }

        let live: Vec<&TestNode> = nodes[..remaining].iter().collect();
        let outcomes = run_round(&live, &Pulse::first()).await;

        for outcome in &outcomes {
            let report = outcome.report().unwrap_or_else(|| panic!("size {} must commit", size));
            assert_eq!(report.active_before, nodes.len());
            assert_eq!(report.active_after, remaining);
            assert_eq!(report.abstentions.len(), silent);
        }
        for node in &nodes[..remaining] {
            assert_eq!(node.registry.active_count().await, remaining);
            for gone in &nodes[remaining..] {
                assert!(node.registry.active_node(&gone.info.reference()).await.is_none());
            }
        }
    }
}

#[tokio::test]
async fn test_lone_node_round_aborts_and_keeps_active_set() {
    let network = InMemoryNetwork::new();
    let nodes = bootstrap(&network, 5).await;
    for node in &nodes[1..] {
        isolate(&network, &node.consensus_addr);
    }

    let outcomes = run_round(&[&nodes[0]], &Pulse::first()).await;

    for outcome in outcomes {
        match outcome {
            RoundOutcome::Aborted { phase, reason, .. } => {
                assert_eq!(phase, RoundPhase::Phase1);
                assert!(matches!(
                    reason,
                    ConsensusError::QuorumNotReached {
                        respondents: 1,
                        required: 2,
                        ..
                    }
                ));
            }
            RoundOutcome::Committed(_) => panic!("one node of five must not commit"),
        }
    }
    assert_eq!(nodes[0].registry.active_count().await, 5);
}

#[tokio::test]
async fn test_graceful_leave_is_omitted_next_round() {
    let network = InMemoryNetwork::new();
    let nodes = bootstrap(&network, 5).await;

    let leaving = &nodes[4];
    let told = announce_leave(&leaving.registry, &leaving.endpoint).await.unwrap();
    assert_eq!(told, 4);
    network.unregister(&leaving.consensus_addr);

    let staying: Vec<&TestNode> = nodes[..4].iter().collect();
    let outcomes = run_round(&staying, &Pulse::first()).await;

    for outcome in &outcomes {
        assert_eq!(outcome.report().expect("committed").active_after, 4);
    }
    for node in &nodes[..4] {
        assert!(node.registry.active_node(&leaving.info.reference()).await.is_none());
    }
}

#[tokio::test]
async fn test_origin_silent_in_phase2_aborts_only_origin() {
    let network = InMemoryNetwork::new();
    let nodes = bootstrap(&network, 5).await;

    let origin = nodes[0].consensus_addr.clone();
    network.add_drop_filter(Arc::new(move |e: &Envelope| {
        e.payload_type == PayloadType::Phase2 && (e.sender == origin || e.receiver == origin)
    }));

    let all: Vec<&TestNode> = nodes.iter().collect();
    let outcomes = run_round(&all, &Pulse::first()).await;

    match &outcomes[0] {
        RoundOutcome::Aborted { phase, .. } => assert_eq!(*phase, RoundPhase::Phase2),
        RoundOutcome::Committed(_) => panic!("origin lost phase 2 and must abort"),
    }
    assert!(nodes[0].registry.cloud_hash().await.is_none());
    assert!(nodes[0].registry.proposal().await.is_none());
    assert_eq!(nodes[0].registry.active_count().await, 5);

    for outcome in &outcomes[1..] {
        let report = outcome.report().expect("committed");
        assert_eq!(report.active_after, 5);
    }
}

#[tokio::test]
async fn test_consecutive_pulses_commit_in_order() {
    let network = InMemoryNetwork::new();
    let nodes = bootstrap(&network, 3).await;
    let all: Vec<&TestNode> = nodes.iter().collect();

    let first = Pulse::first();
    let second = first.next(config().pulse_delta);

    let a = run_round(&all, &first).await;
    let b = run_round(&all, &second).await;

    let hash_a = a[0].report().expect("committed").cloud_hash;
    let hash_b = b[0].report().expect("committed").cloud_hash;
    assert_ne!(hash_a, hash_b);
    assert_eq!(nodes[2].registry.cloud_hash().await, Some(hash_b));
}

#[tokio::test]
async fn test_future_timeout_runs_callback_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use pulse_network::{Future, FutureError, Messenger};

    let network = InMemoryNetwork::new();
    let endpoint = network.endpoint("127.0.0.1:9001");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let future = endpoint
        .send_request(
            "127.0.0.1:9999",
            PayloadType::Phase1,
            vec![],
            Some(Box::new(move |_: &Future| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .unwrap();

    let err = future.await_result(Duration::from_millis(10)).await.unwrap_err();
    assert_eq!(err, FutureError::Timeout(Duration::from_millis(10)));
    future.cancel();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
