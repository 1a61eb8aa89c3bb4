//! Deposit and claim records shared by the orchestrator and chain clients
//!
//! Both record types are transient: they are rebuilt from index queries on
//! every flow and never persisted.

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bridge network identifier (the contract uses `uint32`)
pub type NetworkId = u32;

/// Network id of the L1 (mainnet) bridge
pub const MAINNET_NETWORK_ID: NetworkId = 0;

/// Leaf type recorded in the source network's deposit tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafType {
    Asset,
    Message,
}

impl LeafType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LeafType::Asset),
            1 => Some(LeafType::Message),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            LeafType::Asset => 0,
            LeafType::Message => 1,
        }
    }
}

/// A leaf emitted by a bridge transaction on a source network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub source_network: NetworkId,
    pub destination_network: NetworkId,
    pub deposit_count: u32,
    pub leaf_type: LeafType,
    /// Home network of the bridged token (asset) or the sender's network (message)
    pub origin_network: NetworkId,
    pub amount: U256,
    pub calldata: Bytes,
    pub bridge_tx_hash: H256,
    pub block_num: u64,
    pub origin_address: Address,
    pub destination_address: Address,
    pub metadata: Bytes,
}

impl Deposit {
    /// Classify this deposit into a claimable leg
    pub fn leg_kind(&self) -> Option<LegKind> {
        classify(self.leaf_type, self.amount, &self.calldata)
    }

    /// Global index the destination bridge expects for this deposit
    pub fn global_index(&self) -> U256 {
        global_index(self.deposit_count, self.source_network)
    }
}

/// Claimable leg of a bridge transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    Asset,
    Message,
}

impl fmt::Display for LegKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegKind::Asset => write!(f, "asset"),
            LegKind::Message => write!(f, "message"),
        }
    }
}

/// Classify a leaf by `(leaf_type, amount, calldata)`.
///
/// Asset leaves must move a non-zero amount and message leaves must carry
/// calldata; every other combination is unclassifiable.
pub fn classify(leaf_type: LeafType, amount: U256, calldata: &[u8]) -> Option<LegKind> {
    match leaf_type {
        LeafType::Asset if !amount.is_zero() => Some(LegKind::Asset),
        LeafType::Message if !calldata.is_empty() => Some(LegKind::Message),
        _ => None,
    }
}

/// Encode a deposit count into the destination chain's global index.
///
/// Mainnet deposits are offset by 2^31; rollup deposits are offset by
/// `(network - 1) * 2^32`.
pub fn global_index(deposit_count: u32, source_network: NetworkId) -> U256 {
    let local = U256::from(deposit_count);
    if source_network == MAINNET_NETWORK_ID {
        local + U256::from(1u64 << 31)
    } else {
        local + U256::from(u64::from(source_network - 1)) * U256::from(1u64 << 32)
    }
}

/// Expected leg set of a bridge operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Pure asset bridge (`bridgeAsset`)
    Asset,
    /// Pure message bridge (`bridgeMessage`)
    Message,
    /// Bridge-and-call: one asset leg followed by one message leg
    AssetAndMessage,
}

impl Topology {
    /// Legs that must be discovered, in claim order
    pub fn expected_legs(self) -> &'static [LegKind] {
        match self {
            Topology::Asset => &[LegKind::Asset],
            Topology::Message => &[LegKind::Message],
            Topology::AssetAndMessage => &[LegKind::Asset, LegKind::Message],
        }
    }

    pub fn expects(self, kind: LegKind) -> bool {
        self.expected_legs().contains(&kind)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Asset => write!(f, "asset"),
            Topology::Message => write!(f, "message"),
            Topology::AssetAndMessage => write!(f, "asset_and_message"),
        }
    }
}

/// Latency class of a (source, destination) network pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairClass {
    L1ToL2,
    L2ToL1,
    /// Two rollups with no common validating hop
    L2ToL2,
}

impl PairClass {
    pub fn of(source: NetworkId, destination: NetworkId) -> Self {
        match (source, destination) {
            (MAINNET_NETWORK_ID, _) => PairClass::L1ToL2,
            (_, MAINNET_NETWORK_ID) => PairClass::L2ToL1,
            _ => PairClass::L2ToL2,
        }
    }
}

impl fmt::Display for PairClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairClass::L1ToL2 => write!(f, "l1_to_l2"),
            PairClass::L2ToL1 => write!(f, "l2_to_l1"),
            PairClass::L2ToL2 => write!(f, "l2_to_l2"),
        }
    }
}

/// Claim type as reported by the destination index.
///
/// Not authoritative: some indexers report message claims as `asset` with a
/// zero amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Asset,
    Message,
}

/// Claim status as observed by the destination index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Completed,
}

/// Claim sponsor's view of a claim it was handed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SponsoredClaimStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl SponsoredClaimStatus {
    /// Unrecognized states count as pending
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" | "completed" => SponsoredClaimStatus::Success,
            "failed" | "failure" => SponsoredClaimStatus::Failed,
            "work in progress" | "in progress" | "in_progress" | "wip" => {
                SponsoredClaimStatus::InProgress
            }
            _ => SponsoredClaimStatus::Pending,
        }
    }
}

/// Destination-network record of a satisfied deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub origin_network: NetworkId,
    pub destination_network: NetworkId,
    pub deposit_count: Option<u32>,
    pub global_index: Option<U256>,
    pub claim_type: Option<ClaimType>,
    pub status: ClaimStatus,
    pub claim_tx_hash: Option<H256>,
    pub bridge_tx_hash: Option<H256>,
    pub origin_address: Address,
    pub destination_address: Address,
    pub amount: U256,
    pub block_num: u64,
}

impl Claim {
    pub fn is_completed(&self) -> bool {
        self.status == ClaimStatus::Completed
    }
}
