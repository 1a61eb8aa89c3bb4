//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Deposit discovery
//! - Claim submissions and completions
//! - Flow outcomes and latency
//! - Backend health

use crate::coordination::FlowStatus;
use crate::error::{ClaimerError, ClaimerResult};
use crate::types::{LegKind, NetworkId, PairClass};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Discovery metrics
    pub static ref DEPOSITS_DISCOVERED: CounterVec = register_counter_vec!(
        "claimer_deposits_discovered_total",
        "Deposit legs discovered on source networks",
        &["network_id", "leg"]
    ).unwrap();

    pub static ref DISCOVERY_FAILURES: CounterVec = register_counter_vec!(
        "claimer_discovery_failures_total",
        "Bridge transactions whose legs never appeared",
        &["network_id"]
    ).unwrap();

    // Claim metrics
    pub static ref CLAIM_SUBMISSIONS: CounterVec = register_counter_vec!(
        "claimer_claim_submissions_total",
        "Claim submissions by outcome",
        &["network_id", "outcome"]
    ).unwrap();

    pub static ref CLAIMS_COMPLETED: CounterVec = register_counter_vec!(
        "claimer_claims_completed_total",
        "Claims observed as completed on the destination index",
        &["network_id", "leg"]
    ).unwrap();

    pub static ref POLL_TIMEOUTS: CounterVec = register_counter_vec!(
        "claimer_poll_timeouts_total",
        "Claims left indeterminate after the poll budget",
        &["network_id", "leg"]
    ).unwrap();

    // Flow metrics
    pub static ref FLOW_OUTCOMES: CounterVec = register_counter_vec!(
        "claimer_flows_total",
        "Finished flows by status",
        &["status"]
    ).unwrap();

    pub static ref FLOW_LATENCY: HistogramVec = register_histogram_vec!(
        "claimer_flow_latency_seconds",
        "End-to-end flow latency",
        &["pair"],
        vec![10.0, 30.0, 60.0, 90.0, 120.0, 180.0, 300.0, 600.0]
    ).unwrap();

    // Health metrics
    pub static ref NETWORK_HEALTHY: GaugeVec = register_gauge_vec!(
        "claimer_network_healthy",
        "RPC and indexer health per network (1=healthy, 0=unhealthy)",
        &["network_id"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> ClaimerResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ClaimerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| ClaimerError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Encode every registered metric in the text exposition format
pub fn render() -> ClaimerResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ClaimerError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| ClaimerError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_deposit_discovered(network_id: NetworkId, leg: LegKind) {
    DEPOSITS_DISCOVERED
        .with_label_values(&[&network_id.to_string(), &leg.to_string()])
        .inc();
}

pub fn record_discovery_failure(network_id: NetworkId) {
    DISCOVERY_FAILURES
        .with_label_values(&[&network_id.to_string()])
        .inc();
}

pub fn record_claim_submission(network_id: NetworkId, outcome: &str) {
    CLAIM_SUBMISSIONS
        .with_label_values(&[&network_id.to_string(), outcome])
        .inc();
}

pub fn record_claim_completed(network_id: NetworkId, leg: LegKind) {
    CLAIMS_COMPLETED
        .with_label_values(&[&network_id.to_string(), &leg.to_string()])
        .inc();
}

pub fn record_poll_timeout(network_id: NetworkId, leg: LegKind) {
    POLL_TIMEOUTS
        .with_label_values(&[&network_id.to_string(), &leg.to_string()])
        .inc();
}

pub fn record_flow_outcome(status: FlowStatus) {
    FLOW_OUTCOMES.with_label_values(&[status.as_str()]).inc();
}

pub fn record_flow_latency(pair: PairClass, latency_secs: f64) {
    FLOW_LATENCY
        .with_label_values(&[&pair.to_string()])
        .observe(latency_secs);
}

pub fn record_network_health(network_id: NetworkId, healthy: bool) {
    NETWORK_HEALTHY
        .with_label_values(&[&network_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_output_contains_recorded_series() {
        record_claim_submission(7, "already_claimed");
        record_flow_outcome(FlowStatus::Indeterminate);

        let output = render().unwrap();
        assert!(output.contains("claimer_claim_submissions_total"));
        assert!(output.contains("outcome=\"already_claimed\""));
        assert!(output.contains("status=\"indeterminate\""));
    }
}
