//! HTTP API for health checks and flow status

use crate::chain::ChainClient;
use crate::config::ApiConfig;
use crate::error::{ClaimerError, ClaimerResult};
use crate::metrics;
use crate::state::{FlowRecord, FlowRegistry, FlowStats};
use crate::types::NetworkId;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FlowRegistry>,
    pub client: Arc<dyn ChainClient>,
    pub started: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/flows", get(list_flows))
        .route("/flows/:id", get(get_flow))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(
    config: ApiConfig,
    registry: Arc<FlowRegistry>,
    client: Arc<dyn ChainClient>,
) -> ClaimerResult<()> {
    let app = router(AppState {
        registry,
        client,
        started: Instant::now(),
    });

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ClaimerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| ClaimerError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        flows: state.registry.stats(),
    })
}

/// Readiness check - every configured network's RPC and indexer answer
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.client.health_check().await;
    for (network_id, healthy) in &health {
        metrics::record_network_health(*network_id, *healthy);
    }

    let ready = health.iter().all(|(_, healthy)| *healthy);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            networks: health
                .into_iter()
                .map(|(network_id, healthy)| NetworkHealth {
                    network_id,
                    healthy,
                })
                .collect(),
        }),
    )
}

async fn list_flows(State(state): State<AppState>) -> impl IntoResponse {
    Json(FlowsResponse {
        stats: state.registry.stats(),
        flows: state.registry.list(),
    })
}

async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FlowRecord>, StatusCode> {
    state.registry.get(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    flows: FlowStats,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    networks: Vec<NetworkHealth>,
}

#[derive(Serialize)]
struct NetworkHealth {
    network_id: NetworkId,
    healthy: bool,
}

#[derive(Serialize)]
struct FlowsResponse {
    stats: FlowStats,
    flows: Vec<FlowRecord>,
}
