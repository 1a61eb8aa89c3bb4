//! Chain module - the orchestrator's view of the bridge networks
//!
//! This module provides:
//! - The `ChainClient` trait the orchestrator consumes
//! - A concrete client over the bridge indexer REST API and JSON-RPC nodes
//! - Multi-RPC provider management with automatic failover
//! - Bridge contract bindings and revert classification

pub mod client;
pub mod contracts;
pub mod indexer;
pub mod provider;

pub use client::BridgeChainClient;
pub use indexer::IndexerClient;
pub use provider::NetworkProvider;

use crate::error::{ClaimerError, ClaimerResult};
use crate::types::{Claim, Deposit, NetworkId, SponsoredClaimStatus, Topology};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use serde::Serialize;

/// Deposit to submit on a source network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositRequest {
    pub source_network: NetworkId,
    pub destination_network: NetworkId,
    pub leg: DepositLeg,
}

/// Leg parameters for each deposit variant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DepositLeg {
    /// `bridgeAsset`; the zero token address bridges the native coin
    Asset {
        token: Address,
        amount: U256,
        destination_address: Address,
    },
    /// `bridgeMessage`
    Message {
        destination_address: Address,
        value: U256,
        metadata: Bytes,
    },
    /// `bridgeAndCall`, emitting one asset leaf and one message leaf
    AssetAndMessage {
        token: Address,
        amount: U256,
        call_address: Address,
        fallback_address: Address,
        calldata: Bytes,
    },
}

impl DepositLeg {
    /// Leg set the deposit emits
    pub fn topology(&self) -> Topology {
        match self {
            DepositLeg::Asset { .. } => Topology::Asset,
            DepositLeg::Message { .. } => Topology::Message,
            DepositLeg::AssetAndMessage { .. } => Topology::AssetAndMessage,
        }
    }
}

/// How a claim identifies its deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimTarget {
    /// Exact leg of a (possibly multi-leg) bridge transaction
    DepositCount {
        bridge_tx_hash: H256,
        deposit_count: u32,
    },
    /// First leg of the bridge transaction; only unambiguous for single-leg deposits
    TxHash(H256),
}

impl ClaimTarget {
    pub fn bridge_tx_hash(&self) -> H256 {
        match self {
            ClaimTarget::DepositCount { bridge_tx_hash, .. } => *bridge_tx_hash,
            ClaimTarget::TxHash(hash) => *hash,
        }
    }

    pub fn deposit_count(&self) -> Option<u32> {
        match self {
            ClaimTarget::DepositCount { deposit_count, .. } => Some(*deposit_count),
            ClaimTarget::TxHash(_) => None,
        }
    }
}

/// One claim submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClaimRequest {
    pub destination_network: NetworkId,
    pub source_network: NetworkId,
    pub target: ClaimTarget,
}

impl ClaimRequest {
    /// Claim a discovered deposit by its deposit count
    pub fn for_deposit(deposit: &Deposit) -> Self {
        Self {
            destination_network: deposit.destination_network,
            source_network: deposit.source_network,
            target: ClaimTarget::DepositCount {
                bridge_tx_hash: deposit.bridge_tx_hash,
                deposit_count: deposit.deposit_count,
            },
        }
    }
}

/// Everything the orchestrator needs from the bridge networks.
///
/// Implementations must be safe to share between concurrent flows.
/// `submit_claim` reports an already-claimed deposit as
/// `ClaimerError::AlreadyClaimed` and an exit root the destination has not yet
/// absorbed as `ClaimerError::ExitRootNotReady`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submit a bridge transaction, returning its hash
    async fn submit_deposit(&self, request: &DepositRequest) -> ClaimerResult<H256>;

    /// Query a network's deposit index, optionally filtered by bridge transaction
    async fn query_deposits(
        &self,
        network_id: NetworkId,
        tx_hash: Option<H256>,
    ) -> ClaimerResult<Vec<Deposit>>;

    /// Submit one claim on the destination network
    async fn submit_claim(&self, request: &ClaimRequest) -> ClaimerResult<H256>;

    /// Query a network's claim index
    async fn query_claims(&self, network_id: NetworkId) -> ClaimerResult<Vec<Claim>>;

    /// Hand one claim to the destination's claim sponsor, returning the global
    /// index the sponsor tracks it under
    async fn sponsor_claim(&self, _request: &ClaimRequest) -> ClaimerResult<U256> {
        Err(ClaimerError::Config(
            "claim sponsoring is not supported by this client".to_string(),
        ))
    }

    /// Sponsor's status for the claim of `global_index` on `network_id`
    async fn sponsored_claim_status(
        &self,
        _network_id: NetworkId,
        _global_index: U256,
    ) -> ClaimerResult<SponsoredClaimStatus> {
        Err(ClaimerError::Config(
            "claim sponsoring is not supported by this client".to_string(),
        ))
    }

    /// Whether the destination can already claim `deposit`; `None` when the
    /// client has no readiness signal
    async fn deposit_ready(
        &self,
        _destination_network: NetworkId,
        _deposit: &Deposit,
    ) -> ClaimerResult<Option<bool>> {
        Ok(None)
    }

    /// Per-network health of the client's backends
    async fn health_check(&self) -> Vec<(NetworkId, bool)> {
        Vec::new()
    }
}
