//! REST client for the bridge indexing service
//!
//! Every network is served by an indexer exposing `/bridge/v1/*`. Records are
//! decoded into typed wire structs here and converted to `Deposit`/`Claim`, so
//! nothing above this module handles raw JSON. List records are decoded one at
//! a time; a malformed record is skipped without failing the response.

use crate::error::{ClaimerError, ClaimerResult};
use crate::types::{
    Claim, ClaimStatus, ClaimType, Deposit, LeafType, NetworkId, SponsoredClaimStatus,
};

use ethers::types::{Address, Bytes, H256, U256};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Exit roots a claim must be proven against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimProof {
    pub mainnet_exit_root: H256,
    pub rollup_exit_root: H256,
}

/// Indexer endpoints keyed by bridge network id
pub struct IndexerClient {
    client: Client,
    endpoints: HashMap<NetworkId, String>,
}

impl IndexerClient {
    pub fn new(endpoints: HashMap<NetworkId, String>) -> ClaimerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClaimerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let endpoints = endpoints
            .into_iter()
            .map(|(id, url)| (id, url.trim_end_matches('/').to_string()))
            .collect();

        Ok(Self { client, endpoints })
    }

    /// Networks this client can reach
    pub fn networks(&self) -> Vec<NetworkId> {
        let mut ids: Vec<_> = self.endpoints.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// All deposits indexed on `network_id`
    pub async fn get_deposits(&self, network_id: NetworkId) -> ClaimerResult<Vec<Deposit>> {
        let path = format!("bridges?network_id={}", network_id);
        let response: BridgesResponse = self.get(network_id, &path).await?;
        Ok(decode_deposits(response.bridges, network_id))
    }

    /// All claims indexed on `network_id`
    pub async fn get_claims(&self, network_id: NetworkId) -> ClaimerResult<Vec<Claim>> {
        let path = format!("claims?network_id={}", network_id);
        let response: ClaimsResponse = self.get(network_id, &path).await?;
        Ok(decode_claims(response.claims, network_id))
    }

    /// Index of the L1 info tree leaf that first includes `deposit_count`
    pub async fn get_l1_info_tree_index(
        &self,
        network_id: NetworkId,
        deposit_count: u32,
    ) -> ClaimerResult<u64> {
        let path = format!(
            "l1-info-tree-index?network_id={}&deposit_count={}",
            network_id, deposit_count
        );
        let response: TreeIndexResponse = self.get(network_id, &path).await?;
        Ok(response.index())
    }

    /// Exit roots for claiming `deposit_count` against `leaf_index`
    pub async fn get_claim_proof(
        &self,
        network_id: NetworkId,
        leaf_index: u64,
        deposit_count: u32,
    ) -> ClaimerResult<ClaimProof> {
        let path = format!(
            "claim-proof?network_id={}&leaf_index={}&deposit_count={}",
            network_id, leaf_index, deposit_count
        );
        let response: ClaimProofResponse = self.get(network_id, &path).await?;
        Ok(ClaimProof {
            mainnet_exit_root: response.l1_info_tree_leaf.mainnet_exit_root,
            rollup_exit_root: response.l1_info_tree_leaf.rollup_exit_root,
        })
    }

    /// Hand a claim to the claim sponsor serving `network_id`
    pub async fn post_sponsor_claim(
        &self,
        network_id: NetworkId,
        body: &SponsorClaimBody,
    ) -> ClaimerResult<()> {
        let url = self.url(network_id, "sponsor-claim")?;
        debug!("POST {} (global index {})", url, body.global_index);
        self.send(network_id, &url, self.client.post(&url).json(body))
            .await?;
        Ok(())
    }

    /// Claim sponsor's status for `global_index`
    pub async fn get_sponsored_claim_status(
        &self,
        network_id: NetworkId,
        global_index: U256,
    ) -> ClaimerResult<SponsoredClaimStatus> {
        let path = format!(
            "sponsored-claim-status?global_index={}&network_id={}",
            global_index, network_id
        );
        let response: SponsoredStatusResponse = self.get(network_id, &path).await?;
        Ok(response.status())
    }

    /// Whether the indexer for `network_id` answers
    pub async fn health_check(&self, network_id: NetworkId) -> bool {
        self.get_deposits(network_id).await.is_ok()
    }

    fn url(&self, network_id: NetworkId, path: &str) -> ClaimerResult<String> {
        let base = self
            .endpoints
            .get(&network_id)
            .ok_or(ClaimerError::NetworkNotFound { network_id })?;
        Ok(format!("{}/bridge/v1/{}", base, path))
    }

    async fn get<T: DeserializeOwned>(&self, network_id: NetworkId, path: &str) -> ClaimerResult<T> {
        let url = self.url(network_id, path)?;
        debug!("GET {}", url);

        self.send(network_id, &url, self.client.get(&url))
            .await?
            .json::<T>()
            .await
            .map_err(|e| ClaimerError::Indexer {
                network_id,
                message: format!("invalid response from {}: {}", url, e),
            })
    }

    async fn send(
        &self,
        network_id: NetworkId,
        url: &str,
        request: RequestBuilder,
    ) -> ClaimerResult<reqwest::Response> {
        let indexer_error = |message: String| ClaimerError::Indexer {
            network_id,
            message,
        };

        let response = request
            .send()
            .await
            .map_err(|e| indexer_error(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(indexer_error(format!("{} returned {}", url, status)));
        }
        Ok(response)
    }
}

/// Decode deposit records one by one, skipping the ones that do not parse
fn decode_deposits(records: Vec<Value>, network_id: NetworkId) -> Vec<Deposit> {
    let mut deposits = Vec::with_capacity(records.len());
    for record in records {
        let decoded = serde_json::from_value::<BridgeRecord>(record)
            .map_err(|e| ClaimerError::MalformedRecord(e.to_string()))
            .and_then(|r| r.into_deposit(network_id));
        match decoded {
            Ok(deposit) => deposits.push(deposit),
            Err(e) => warn!("Skipping deposit record on network {}: {}", network_id, e),
        }
    }
    deposits
}

fn decode_claims(records: Vec<Value>, network_id: NetworkId) -> Vec<Claim> {
    let mut claims = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_value::<ClaimRecord>(record) {
            Ok(record) => claims.push(record.into_claim()),
            Err(e) => warn!("Skipping claim record on network {}: {}", network_id, e),
        }
    }
    claims
}

/// Body of `POST /bridge/v1/sponsor-claim`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SponsorClaimBody {
    pub leaf_type: u8,
    pub global_index: u64,
    pub mainnet_exit_root: H256,
    pub rollup_exit_root: H256,
    pub origin_network: NetworkId,
    pub origin_token_address: Address,
    pub destination_network: NetworkId,
    pub destination_address: Address,
    pub amount: u64,
    pub metadata: Bytes,
}

impl SponsorClaimBody {
    /// The sponsor takes 64-bit global indexes and amounts
    pub fn new(deposit: &Deposit, proof: &ClaimProof) -> ClaimerResult<Self> {
        let global_index = deposit.global_index();
        let too_large = |what: &str, value: U256| {
            ClaimerError::Config(format!(
                "{} {} of deposit {} exceeds what the claim sponsor accepts",
                what, value, deposit.deposit_count
            ))
        };
        if global_index > U256::from(u64::MAX) {
            return Err(too_large("global index", global_index));
        }
        if deposit.amount > U256::from(u64::MAX) {
            return Err(too_large("amount", deposit.amount));
        }

        Ok(Self {
            leaf_type: deposit.leaf_type.as_u8(),
            global_index: global_index.as_u64(),
            mainnet_exit_root: proof.mainnet_exit_root,
            rollup_exit_root: proof.rollup_exit_root,
            origin_network: deposit.origin_network,
            origin_token_address: deposit.origin_address,
            destination_network: deposit.destination_network,
            destination_address: deposit.destination_address,
            amount: deposit.amount.as_u64(),
            metadata: deposit.metadata.clone(),
        })
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct BridgesResponse {
    #[serde(default)]
    bridges: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct BridgeRecord {
    #[serde(default, deserialize_with = "de_opt_hash")]
    bridge_tx_hash: Option<H256>,
    #[serde(default, deserialize_with = "de_opt_hash")]
    tx_hash: Option<H256>,
    leaf_type: u8,
    #[serde(default)]
    origin_network: Option<NetworkId>,
    destination_network: NetworkId,
    #[serde(default)]
    origin_address: Address,
    #[serde(default)]
    destination_address: Address,
    #[serde(default, deserialize_with = "de_amount")]
    amount: U256,
    #[serde(default, deserialize_with = "de_opt_bytes")]
    metadata: Option<Bytes>,
    #[serde(default, deserialize_with = "de_opt_bytes")]
    calldata: Option<Bytes>,
    deposit_count: u32,
    #[serde(default)]
    block_num: u64,
}

impl BridgeRecord {
    /// `source_network` is the network that was queried. The record's
    /// `origin_network` is the token's home network and defaults to it.
    fn into_deposit(self, source_network: NetworkId) -> ClaimerResult<Deposit> {
        let leaf_type = LeafType::from_u8(self.leaf_type).ok_or_else(|| {
            ClaimerError::MalformedRecord(format!("unknown leaf type {}", self.leaf_type))
        })?;
        let bridge_tx_hash = self.bridge_tx_hash.or(self.tx_hash).ok_or_else(|| {
            ClaimerError::MalformedRecord(format!(
                "deposit {} has no transaction hash",
                self.deposit_count
            ))
        })?;

        let metadata = self.metadata.unwrap_or_default();
        let calldata = match (self.calldata, leaf_type) {
            (Some(calldata), _) if !calldata.is_empty() => calldata,
            (_, LeafType::Message) => metadata.clone(),
            _ => Bytes::new(),
        };

        Ok(Deposit {
            source_network,
            destination_network: self.destination_network,
            deposit_count: self.deposit_count,
            leaf_type,
            origin_network: self.origin_network.unwrap_or(source_network),
            amount: self.amount,
            calldata,
            bridge_tx_hash,
            block_num: self.block_num,
            origin_address: self.origin_address,
            destination_address: self.destination_address,
            metadata,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsResponse {
    #[serde(default)]
    claims: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ClaimRecord {
    #[serde(default, deserialize_with = "de_opt_hash")]
    claim_tx_hash: Option<H256>,
    #[serde(default, deserialize_with = "de_opt_hash")]
    tx_hash: Option<H256>,
    #[serde(default, deserialize_with = "de_opt_hash")]
    bridge_tx_hash: Option<H256>,
    origin_network: NetworkId,
    destination_network: NetworkId,
    #[serde(default)]
    origin_address: Address,
    #[serde(default)]
    destination_address: Address,
    #[serde(default, deserialize_with = "de_amount")]
    amount: U256,
    #[serde(default, deserialize_with = "de_opt_amount")]
    global_index: Option<U256>,
    #[serde(default)]
    deposit_count: Option<u32>,
    #[serde(default, rename = "type")]
    claim_type: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_num: u64,
}

impl ClaimRecord {
    fn into_claim(self) -> Claim {
        let claim_type = match self.claim_type.as_deref() {
            Some("asset") => Some(ClaimType::Asset),
            Some("message") => Some(ClaimType::Message),
            _ => None,
        };
        let status = match self.status.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("completed") => ClaimStatus::Completed,
            _ => ClaimStatus::Pending,
        };

        Claim {
            origin_network: self.origin_network,
            destination_network: self.destination_network,
            deposit_count: self.deposit_count,
            global_index: self.global_index,
            claim_type,
            status,
            claim_tx_hash: self.claim_tx_hash.or(self.tx_hash),
            bridge_tx_hash: self.bridge_tx_hash,
            origin_address: self.origin_address,
            destination_address: self.destination_address,
            amount: self.amount,
            block_num: self.block_num,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TreeIndexResponse {
    Wrapped { l1_info_tree_index: u64 },
    Bare(u64),
}

impl TreeIndexResponse {
    fn index(&self) -> u64 {
        match self {
            TreeIndexResponse::Wrapped { l1_info_tree_index } => *l1_info_tree_index,
            TreeIndexResponse::Bare(index) => *index,
        }
    }
}

/// The sponsor answers with a bare status or an object carrying one
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SponsoredStatusResponse {
    Wrapped { status: String },
    Bare(String),
}

impl SponsoredStatusResponse {
    fn status(&self) -> SponsoredClaimStatus {
        match self {
            SponsoredStatusResponse::Wrapped { status } | SponsoredStatusResponse::Bare(status) => {
                SponsoredClaimStatus::parse(status)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClaimProofResponse {
    l1_info_tree_leaf: ProofLeaf,
}

#[derive(Debug, Deserialize)]
struct ProofLeaf {
    mainnet_exit_root: H256,
    rollup_exit_root: H256,
}

/// Amounts arrive as decimal strings or plain numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Text(String),
    Number(u64),
}

impl RawAmount {
    fn parse(self) -> Result<U256, String> {
        match self {
            RawAmount::Number(n) => Ok(U256::from(n)),
            RawAmount::Text(s) if s.is_empty() => Ok(U256::zero()),
            RawAmount::Text(s) if s.starts_with("0x") => {
                U256::from_str(&s).map_err(|e| format!("invalid amount {}: {}", s, e))
            }
            RawAmount::Text(s) => {
                U256::from_dec_str(&s).map_err(|e| format!("invalid amount {}: {}", s, e))
            }
        }
    }
}

fn de_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    Ok(de_opt_amount(deserializer)?.unwrap_or_default())
}

fn de_opt_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
    match Option::<RawAmount>::deserialize(deserializer)? {
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn de_opt_hash<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<H256>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if s.is_empty() || s == "0x" => Ok(None),
        Some(s) => H256::from_str(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn de_opt_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Bytes>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => hex::decode(s.trim_start_matches("0x"))
            .map(|b| Some(Bytes::from(b)))
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
