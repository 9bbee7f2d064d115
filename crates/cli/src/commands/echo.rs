//! `echo` command implementation.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use broker::InMemoryBroker;
use observability::RpcMetricsAggregator;
use rpc_gateway::{EchoRequest, EchoRpcModule, RpcClientFactory};

use super::load_config;
use crate::cli::EchoArgs;

/// Execute the `echo` command
pub async fn run_echo(args: &EchoArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }
    if args.location == config.identity.location {
        warn!(
            location = %args.location,
            "Echo location is the local location, requests will run in-process"
        );
    }

    let broker = InMemoryBroker::default();
    broker.bind_rpc(
        Arc::new(EchoRpcModule),
        &args.location,
        args.system_id.as_deref(),
    );
    let factory = RpcClientFactory::from_config(Arc::new(broker.clone()), &config)
        .context("Failed to create RPC client factory")?;

    info!(
        local = %factory.location(),
        remote = %args.location,
        count = args.count,
        concurrency = args.concurrency,
        default_timeout_ms = factory.default_timeout().as_millis() as u64,
        "Starting echo run"
    );

    let started = Instant::now();
    let aggregator = tokio::select! {
        aggregator = send_requests(&factory, args) => aggregator?,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping echo run...");
            broker.stop();
            return Ok(());
        }
    };

    let summary = aggregator.summary();
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        duration_secs = started.elapsed().as_secs_f64(),
        "Echo run finished"
    );
    print!("{summary}");

    if summary.total > 0 && summary.succeeded == 0 {
        anyhow::bail!("No echo request succeeded");
    }
    Ok(())
}

async fn send_requests(
    factory: &RpcClientFactory<InMemoryBroker>,
    args: &EchoArgs,
) -> Result<RpcMetricsAggregator> {
    let client = factory.get_client(Arc::new(EchoRpcModule));
    let permits = Arc::new(Semaphore::new(args.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for sequence in 0..args.count {
        let permit = Arc::clone(&permits)
            .acquire_owned()
            .await
            .context("Request limiter closed")?;
        let request = build_request(args);
        let started = Instant::now();
        let pending = client.execute(request);
        tasks.spawn(async move {
            let outcome = pending.await;
            drop(permit);
            (sequence, outcome, started.elapsed())
        });
    }

    let mut aggregator = RpcMetricsAggregator::new();
    while let Some(joined) = tasks.join_next().await {
        let (sequence, outcome, elapsed) = joined.context("Echo task panicked")?;
        match &outcome {
            Ok(response) if response.message != args.message => {
                warn!(sequence, echoed = %response.message, "Echo returned a different message");
            }
            Ok(_) => debug!(sequence, elapsed_ms = elapsed.as_millis() as u64, "Echo ok"),
            Err(e) => warn!(sequence, error = %e, "Echo failed"),
        }
        aggregator.update(&outcome, elapsed);
    }
    Ok(aggregator)
}

fn build_request(args: &EchoArgs) -> EchoRequest {
    let mut request = EchoRequest::new(args.message.clone()).at(args.location.clone());
    if let Some(system_id) = args.target_system_id.as_ref().or(args.system_id.as_ref()) {
        request = request.on_system(system_id.clone());
    }
    if args.ttl_ms > 0 {
        request = request.with_ttl(Duration::from_millis(args.ttl_ms));
    }
    if args.delay_ms > 0 {
        request = request.with_delay(Duration::from_millis(args.delay_ms));
    }
    if args.fail {
        request = request.failing();
    }
    request
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
