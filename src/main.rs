//! Bridge Claimer daemon
//!
//! Runs every configured claim flow concurrently against the bridge indexers
//! and JSON-RPC nodes, exposing metrics and flow status over HTTP.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use bridge_claimer::api;
use bridge_claimer::chain::{BridgeChainClient, ChainClient};
use bridge_claimer::config::{FlowConfig, Settings};
use bridge_claimer::coordination::FlowOrchestrator;
use bridge_claimer::error::ClaimerError;
use bridge_claimer::metrics::{self, MetricsServer};
use bridge_claimer::state::{FlowRegistry, FlowRequest};
use bridge_claimer::FlowResult;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Bridge Claimer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} networks and {} flows",
        settings.enabled_networks().len(),
        settings.flows.len()
    );

    // Initialize chain client (indexers + RPC providers)
    let wallet = BridgeChainClient::load_wallet(&settings.wallet)?;
    let client: Arc<dyn ChainClient> = Arc::new(
        BridgeChainClient::new(&settings, wallet).context("Failed to initialize chain client")?,
    );
    info!("Chain client initialized");

    let orchestrator = Arc::new(FlowOrchestrator::new(
        client.clone(),
        settings.claimer.clone(),
        settings.sync_profiles.clone(),
    ));
    let registry = Arc::new(FlowRegistry::new());

    // Start API server
    let api_handle = if settings.api.enabled {
        let config = settings.api.clone();
        let registry = registry.clone();
        let client = client.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::run_server(config, registry, client).await {
                error!("API server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Health check loop
    let health_handle = tokio::spawn({
        let client = client.clone();
        let interval = settings.claimer.health_check_interval_secs;
        async move {
            loop {
                for (network_id, healthy) in client.health_check().await {
                    if !healthy {
                        warn!("Network {} health check failed", network_id);
                    }
                    metrics::record_network_health(network_id, healthy);
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
            }
        }
    });

    // Start one task per configured flow
    let mut flow_ids = Vec::with_capacity(settings.flows.len());
    let mut flow_handles = Vec::with_capacity(settings.flows.len());
    for flow in settings.flows.iter().cloned() {
        let id = registry.register(FlowRequest::from(&flow));
        flow_ids.push(id);
        let orchestrator = orchestrator.clone();
        let registry = registry.clone();

        flow_handles.push(tokio::spawn(async move {
            info!(
                "Flow {} started: network {} -> {} ({})",
                id, flow.source_network, flow.destination_network, flow.topology
            );
            match run_flow(&orchestrator, &flow).await {
                Ok(result) => registry.finish(id, result),
                Err(e) => {
                    error!("Flow {} errored: {}", id, e);
                    registry.fail(id, e.to_string());
                }
            }
        }));
    }
    let abort_handles: Vec<_> = flow_handles.iter().map(|h| h.abort_handle()).collect();

    info!("Bridge Claimer is running");
    if settings.api.enabled {
        info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    }
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for flows to finish or a shutdown signal
    let interrupted = tokio::select! {
        results = futures::future::join_all(flow_handles) => {
            for (id, result) in flow_ids.into_iter().zip(results) {
                if let Err(e) = result {
                    error!("Flow {} task ended abnormally: {}", id, e);
                    registry.abandon(id, format!("flow task ended abnormally: {}", e));
                }
            }
            false
        }
        _ = shutdown_signal() => true,
    };

    if interrupted {
        info!("Shutdown signal received, stopping...");
        for handle in abort_handles {
            handle.abort();
        }
        if !registry.is_idle() {
            warn!("{} flows were still running", registry.stats().running);
        }
    } else {
        let stats = registry.stats();
        info!(
            "All flows finished: {} completed, {} failed, {} indeterminate, {} timed out, {} errored",
            stats.completed, stats.failed, stats.indeterminate, stats.timed_out, stats.errored
        );

        if settings.api.enabled {
            info!("Flow status stays available until shutdown");
            shutdown_signal().await;
            info!("Shutdown signal received, stopping...");
        }
    }

    // Abort background tasks
    health_handle.abort();
    if let Some(h) = api_handle {
        h.abort();
    }
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Bridge Claimer stopped");

    let stats = registry.stats();
    let unsuccessful = stats.running
        + stats.failed
        + stats.indeterminate
        + stats.timed_out
        + stats.errored;
    if !interrupted && unsuccessful > 0 {
        anyhow::bail!("{} flows did not complete", unsuccessful);
    }
    Ok(())
}

async fn run_flow(
    orchestrator: &FlowOrchestrator,
    flow: &FlowConfig,
) -> Result<FlowResult, ClaimerError> {
    let deposit = flow
        .deposit_request()
        .map_err(|e| ClaimerError::Config(e.to_string()))?;

    match (deposit, flow.bridge_tx_hash) {
        (Some(request), _) => orchestrator.submit_and_claim(request, flow.topology).await,
        (None, Some(bridge_tx_hash)) => Ok(orchestrator
            .run_claim_flow(
                bridge_tx_hash,
                flow.source_network,
                flow.destination_network,
                flow.topology,
            )
            .await),
        (None, None) => Err(ClaimerError::Config(
            "flow has neither a deposit nor a bridge transaction".to_string(),
        )),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,bridge_claimer=debug,hyper=warn,reqwest=warn")
    });

    let json = std::env::var("CLAIMER_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
