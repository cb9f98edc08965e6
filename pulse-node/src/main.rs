use std::sync::Arc;

use clap::Parser;
use futures::future::{join_all, select_all};
use pulse_common::auth::Authenticator;
use pulse_consensus::Pulsar;
use pulse_network::InMemoryNetwork;
use pulse_node::cli::Args;
use pulse_node::{build_runtime, Config, PulseDriver};
use rand::rngs::OsRng;
use tokio::sync::{oneshot, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let template = Config::load_or_init(&args.config)?;

    std::fs::create_dir_all(&args.log_dir)?;
    let file_appender =
        tracing_appender::rolling::never(&args.log_dir, format!("consensus-{}.log", template.node_name));
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let consensus_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "consensus"
        }));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pulse_node=debug".into()),
        )
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() != "consensus"
        }));

    tracing_subscriber::registry()
        .with(consensus_layer)
        .with(stdout_layer)
        .init();

    info!("starting local cluster: {} nodes, config {}", args.nodes, args.config.display());

    let network = InMemoryNetwork::new();
    let mut runtimes = Vec::with_capacity(args.nodes);
    let mut shutdowns = Vec::with_capacity(args.nodes);
    for index in 0..args.nodes {
        let config = template.local_node(index)?;
        let auth: Arc<RwLock<dyn Authenticator>> = Arc::new(RwLock::new(config.authenticator(&mut OsRng)?));
        let (runtime, shutdown) = build_runtime(config, auth, &network).await?;
        runtimes.push(Arc::new(runtime));
        shutdowns.push(shutdown);
    }

    for runtime in &runtimes {
        if let Err(e) = runtime.join().await {
            error!("{} could not join: {}", runtime.config.node_name, e);
            return Err(e.into());
        }
    }

    let pulsar = Arc::new(Pulsar::new(
        template.consensus.pulse_interval(),
        template.consensus.pulse_delta,
    ));
    let limit = (args.pulses > 0).then_some(args.pulses);

    let drivers: Vec<_> = runtimes
        .iter()
        .map(|runtime| {
            let driver = PulseDriver::new(Arc::clone(&runtime.executor), Arc::clone(&runtime.supervisor));
            let pulses = pulsar.subscribe();
            tokio::spawn(async move { driver.run(pulses, limit).await })
        })
        .collect();
    let aborts: Vec<_> = drivers.iter().map(|d| d.abort_handle()).collect();

    let (stop_tx, stop_rx) = oneshot::channel();
    let pulsar_task = {
        let pulsar = Arc::clone(&pulsar);
        tokio::spawn(async move { pulsar.run(stop_rx).await })
    };

    let fatal = async {
        if shutdowns.is_empty() {
            futures::future::pending::<()>().await;
        }
        let (reason, index, _) = select_all(shutdowns).await;
        (index, reason)
    };

    tokio::select! {
        results = join_all(drivers) => {
            for (runtime, result) in runtimes.iter().zip(results) {
                match result {
                    Ok(summary) => info!(
                        "{}: {} committed, {} aborted, {} members",
                        runtime.config.node_name,
                        summary.committed,
                        summary.aborted,
                        runtime.registry.active_count().await
                    ),
                    Err(e) => warn!("{} driver task failed: {}", runtime.config.node_name, e),
                }
            }
        }
        (index, reason) = fatal => {
            match reason {
                Ok(reason) => error!("{} stopped on a fatal error: {}", runtimes[index].config.node_name, reason.error),
                Err(_) => error!("{} lost its supervisor", runtimes[index].config.node_name),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
        }
    }

    for abort in aborts {
        abort.abort();
    }
    let _ = stop_tx.send(());
    pulsar_task.await?;

    for runtime in runtimes.iter().filter(|r| !r.config.is_discovery) {
        if let Err(e) = runtime.leave().await {
            warn!("{} did not leave cleanly: {}", runtime.config.node_name, e);
        }
    }

    info!("local cluster stopped");
    Ok(())
}
