//! Concurrent registry of flows run by this process

use crate::config::FlowConfig;
use crate::coordination::{FlowResult, FlowStatus};
use crate::types::{NetworkId, Topology};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ethers::types::H256;
use serde::Serialize;
use uuid::Uuid;

/// What a flow was asked to do
#[derive(Debug, Clone, Serialize)]
pub struct FlowRequest {
    pub source_network: NetworkId,
    pub destination_network: NetworkId,
    pub topology: Topology,
    /// Known up front when claiming an existing bridge transaction
    pub bridge_tx_hash: Option<H256>,
    /// Whether the flow submits its own deposit first
    pub submits_deposit: bool,
}

impl From<&FlowConfig> for FlowRequest {
    fn from(config: &FlowConfig) -> Self {
        Self {
            source_network: config.source_network,
            destination_network: config.destination_network,
            topology: config.topology,
            bridge_tx_hash: config.bridge_tx_hash,
            submits_deposit: config.deposit.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowState {
    Running,
    Finished { result: FlowResult },
    /// The flow never produced a result (e.g. the deposit could not be sent)
    Errored { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowRecord {
    pub id: Uuid,
    pub request: FlowRequest,
    #[serde(flatten)]
    pub state: FlowState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flow counts by state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowStats {
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub indeterminate: u64,
    pub timed_out: u64,
    pub errored: u64,
}

#[derive(Default)]
pub struct FlowRegistry {
    flows: DashMap<Uuid, FlowRecord>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new running flow
    pub fn register(&self, request: FlowRequest) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.flows.insert(
            id,
            FlowRecord {
                id,
                request,
                state: FlowState::Running,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn finish(&self, id: Uuid, result: FlowResult) {
        self.update(id, FlowState::Finished { result });
    }

    pub fn fail(&self, id: Uuid, error: String) {
        self.update(id, FlowState::Errored { error });
    }

    /// Mark a flow errored unless it already reached a result
    pub fn abandon(&self, id: Uuid, error: String) {
        let running = self
            .flows
            .get(&id)
            .is_some_and(|r| matches!(r.value().state, FlowState::Running));
        if running {
            self.update(id, FlowState::Errored { error });
        }
    }

    fn update(&self, id: Uuid, state: FlowState) {
        if let Some(mut record) = self.flows.get_mut(&id) {
            if let FlowState::Finished { result } = &state {
                record.request.bridge_tx_hash = Some(result.bridge_tx_hash);
            }
            record.state = state;
            record.updated_at = Utc::now();
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<FlowRecord> {
        self.flows.get(id).map(|r| r.value().clone())
    }

    /// All flows, oldest first
    pub fn list(&self) -> Vec<FlowRecord> {
        let mut records: Vec<_> = self.flows.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn is_idle(&self) -> bool {
        !self
            .flows
            .iter()
            .any(|r| matches!(r.value().state, FlowState::Running))
    }

    pub fn stats(&self) -> FlowStats {
        let mut stats = FlowStats::default();
        for record in self.flows.iter() {
            match &record.value().state {
                FlowState::Running => stats.running += 1,
                FlowState::Errored { .. } => stats.errored += 1,
                FlowState::Finished { result } => match result.status {
                    FlowStatus::Completed => stats.completed += 1,
                    FlowStatus::Indeterminate => stats.indeterminate += 1,
                    FlowStatus::TimedOut => stats.timed_out += 1,
                    FlowStatus::Failed | FlowStatus::DiscoveryFailed => stats.failed += 1,
                },
            }
        }
        stats
    }
}
