//! Scripted in-memory chain client shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_claimer::chain::{ChainClient, ClaimRequest, ClaimTarget, DepositLeg, DepositRequest};
use bridge_claimer::config::ClaimerConfig;
use bridge_claimer::types::{
    Claim, ClaimStatus, ClaimType, Deposit, LeafType, NetworkId, SponsoredClaimStatus,
};
use bridge_claimer::{ClaimerError, ClaimerResult};

use ethers::types::{Address, Bytes, H256, U256};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Something the fake chain observed, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    DepositSubmitted(H256),
    ClaimSubmitted(u32),
    ClaimSponsored(u32),
    ClaimCompleted(u32),
}

#[derive(Default)]
struct ChainState {
    deposits: HashMap<NetworkId, Vec<Deposit>>,
    claims: HashMap<NetworkId, Vec<(u32, Claim)>>,
    next_deposit_count: HashMap<NetworkId, u32>,
    claimed: HashSet<(NetworkId, u32)>,
    /// Deposit queries that still return nothing
    hidden_deposit_queries: u32,
    /// Submissions that still fail with a not-ready exit root
    not_ready_submissions: u32,
    /// Deposit counts whose claims revert
    failing_claims: HashSet<u32>,
    /// Deposit counts whose claims never reach completed
    stuck_claims: HashSet<u32>,
    /// Polls before a submitted claim shows as completed
    polls_until_completed: u32,
    poll_counts: HashMap<u32, u32>,
    /// Index entries carry neither claim nor bridge transaction hash
    omit_claim_hashes: bool,
    /// Sponsored deposits keyed by (destination, global index)
    sponsored: HashMap<(NetworkId, U256), u32>,
    events: Vec<ChainEvent>,
    tx_counter: u64,
}

/// In-memory bridge: deposits, claims and their indexes
pub struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState::default()),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Seed a leaf emitted by `bridge_tx_hash`
    pub fn seed_deposit(&self, deposit: Deposit) {
        self.with(|s| {
            s.deposits
                .entry(deposit.source_network)
                .or_default()
                .push(deposit)
        });
    }

    pub fn mark_claimed(&self, source_network: NetworkId, deposit_count: u32) {
        self.with(|s| s.claimed.insert((source_network, deposit_count)));
    }

    pub fn hide_deposits_for(&self, queries: u32) {
        self.with(|s| s.hidden_deposit_queries = queries);
    }

    pub fn exit_root_not_ready_for(&self, submissions: u32) {
        self.with(|s| s.not_ready_submissions = submissions);
    }

    pub fn fail_claim(&self, deposit_count: u32) {
        self.with(|s| s.failing_claims.insert(deposit_count));
    }

    pub fn stick_claim(&self, deposit_count: u32) {
        self.with(|s| s.stuck_claims.insert(deposit_count));
    }

    pub fn complete_claims_after(&self, polls: u32) {
        self.with(|s| s.polls_until_completed = polls);
    }

    pub fn omit_claim_hashes(&self) {
        self.with(|s| s.omit_claim_hashes = true);
    }

    pub fn events(&self) -> Vec<ChainEvent> {
        self.with(|s| s.events.clone())
    }

    pub fn submitted_claims(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ChainEvent::ClaimSubmitted(count) => Some(count),
                _ => None,
            })
            .collect()
    }
}

impl ChainState {
    fn next_tx(&mut self) -> H256 {
        self.tx_counter += 1;
        H256::from_low_u64_be(0x1000 + self.tx_counter)
    }

    fn find_deposit(&self, request: &ClaimRequest) -> ClaimerResult<Deposit> {
        let source = request.source_network;
        self.deposits
            .get(&source)
            .and_then(|all| {
                all.iter()
                    .filter(|d| d.bridge_tx_hash == request.target.bridge_tx_hash())
                    .find(|d| match request.target {
                        ClaimTarget::DepositCount { deposit_count, .. } => {
                            d.deposit_count == deposit_count
                        }
                        ClaimTarget::TxHash(_) => true,
                    })
                    .cloned()
            })
            .ok_or_else(|| ClaimerError::DepositNotFound {
                network_id: source,
                bridge_tx_hash: format!("{:?}", request.target.bridge_tx_hash()),
            })
    }

    fn emit(&mut self, source: NetworkId, destination: NetworkId, tx: H256, leg: Leaf) {
        let count = self.next_deposit_count.entry(source).or_insert(0);
        let deposit_count = *count;
        *count += 1;

        let (leaf_type, amount, calldata, destination_address) = leg;
        self.deposits.entry(source).or_default().push(Deposit {
            source_network: source,
            destination_network: destination,
            deposit_count,
            leaf_type,
            origin_network: source,
            amount,
            calldata: calldata.clone(),
            bridge_tx_hash: tx,
            block_num: 100 + deposit_count as u64,
            origin_address: Address::repeat_byte(0x11),
            destination_address,
            metadata: calldata,
        });
    }
}

type Leaf = (LeafType, U256, Bytes, Address);

#[async_trait]
impl ChainClient for FakeChain {
    async fn submit_deposit(&self, request: &DepositRequest) -> ClaimerResult<H256> {
        self.with(|s| {
            let tx = s.next_tx();
            let (src, dst) = (request.source_network, request.destination_network);
            match &request.leg {
                DepositLeg::Asset {
                    amount,
                    destination_address,
                    ..
                } => s.emit(
                    src,
                    dst,
                    tx,
                    (LeafType::Asset, *amount, Bytes::new(), *destination_address),
                ),
                DepositLeg::Message {
                    destination_address,
                    metadata,
                    ..
                } => s.emit(
                    src,
                    dst,
                    tx,
                    (LeafType::Message, U256::zero(), metadata.clone(), *destination_address),
                ),
                DepositLeg::AssetAndMessage {
                    amount,
                    call_address,
                    calldata,
                    ..
                } => {
                    s.emit(
                        src,
                        dst,
                        tx,
                        (LeafType::Asset, *amount, Bytes::new(), *call_address),
                    );
                    s.emit(
                        src,
                        dst,
                        tx,
                        (LeafType::Message, U256::zero(), calldata.clone(), *call_address),
                    );
                }
            }
            s.events.push(ChainEvent::DepositSubmitted(tx));
            Ok(tx)
        })
    }

    async fn query_deposits(
        &self,
        network_id: NetworkId,
        tx_hash: Option<H256>,
    ) -> ClaimerResult<Vec<Deposit>> {
        self.with(|s| {
            if s.hidden_deposit_queries > 0 {
                s.hidden_deposit_queries -= 1;
                return Ok(Vec::new());
            }
            Ok(s.deposits
                .get(&network_id)
                .map(|all| {
                    all.iter()
                        .filter(|d| tx_hash.map_or(true, |h| d.bridge_tx_hash == h))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    async fn submit_claim(&self, request: &ClaimRequest) -> ClaimerResult<H256> {
        self.with(|s| {
            let source = request.source_network;
            let deposit = s.find_deposit(request)?;
            let deposit_count = deposit.deposit_count;
            s.events.push(ChainEvent::ClaimSubmitted(deposit_count));

            if s.claimed.contains(&(source, deposit_count)) {
                return Err(ClaimerError::AlreadyClaimed {
                    source_network: source,
                    deposit_count,
                });
            }
            if s.not_ready_submissions > 0 {
                s.not_ready_submissions -= 1;
                return Err(ClaimerError::ExitRootNotReady {
                    network_id: request.destination_network,
                    message: "GlobalExitRootInvalid()".to_string(),
                });
            }
            if s.failing_claims.contains(&deposit_count) {
                return Err(ClaimerError::Contract("InvalidSmtProof()".to_string()));
            }

            let claim_tx = s.next_tx();
            s.claimed.insert((source, deposit_count));
            let omit = s.omit_claim_hashes;
            // the index reports message claims as zero-amount asset claims
            let claim = Claim {
                origin_network: deposit.origin_network,
                destination_network: deposit.destination_network,
                deposit_count: None,
                global_index: None,
                claim_type: Some(ClaimType::Asset),
                status: ClaimStatus::Pending,
                claim_tx_hash: (!omit).then_some(claim_tx),
                bridge_tx_hash: (!omit).then_some(deposit.bridge_tx_hash),
                origin_address: deposit.origin_address,
                destination_address: deposit.destination_address,
                amount: deposit.amount,
                block_num: 500,
            };
            s.claims
                .entry(request.destination_network)
                .or_default()
                .push((deposit_count, claim));
            Ok(claim_tx)
        })
    }

    async fn query_claims(&self, network_id: NetworkId) -> ClaimerResult<Vec<Claim>> {
        self.with(|s| {
            let threshold = s.polls_until_completed;
            let mut newly_completed = Vec::new();
            let mut claims = s.claims.remove(&network_id).unwrap_or_default();

            for (deposit_count, claim) in claims.iter_mut() {
                if claim.is_completed() || s.stuck_claims.contains(deposit_count) {
                    continue;
                }
                let polls = s.poll_counts.entry(*deposit_count).or_insert(0);
                *polls += 1;
                if *polls > threshold {
                    claim.status = ClaimStatus::Completed;
                    newly_completed.push(*deposit_count);
                }
            }

            let snapshot = claims.iter().map(|(_, c)| c.clone()).collect();
            s.claims.insert(network_id, claims);
            s.events
                .extend(newly_completed.into_iter().map(ChainEvent::ClaimCompleted));
            Ok(snapshot)
        })
    }

    async fn sponsor_claim(&self, request: &ClaimRequest) -> ClaimerResult<U256> {
        self.with(|s| {
            let deposit = s.find_deposit(request)?;
            let global_index = deposit.global_index();
            if s.not_ready_submissions > 0 {
                s.not_ready_submissions -= 1;
                return Err(ClaimerError::ExitRootNotReady {
                    network_id: request.destination_network,
                    message: "no L1 info tree index yet".to_string(),
                });
            }
            s.events
                .push(ChainEvent::ClaimSponsored(deposit.deposit_count));
            s.sponsored
                .insert((request.destination_network, global_index), deposit.deposit_count);
            Ok(global_index)
        })
    }

    async fn sponsored_claim_status(
        &self,
        network_id: NetworkId,
        global_index: U256,
    ) -> ClaimerResult<SponsoredClaimStatus> {
        self.with(|s| {
            let Some(&deposit_count) = s.sponsored.get(&(network_id, global_index)) else {
                return Ok(SponsoredClaimStatus::Pending);
            };
            if s.failing_claims.contains(&deposit_count) {
                return Ok(SponsoredClaimStatus::Failed);
            }
            let polls = s.poll_counts.entry(deposit_count).or_insert(0);
            *polls += 1;
            if *polls > s.polls_until_completed {
                s.events.push(ChainEvent::ClaimCompleted(deposit_count));
                Ok(SponsoredClaimStatus::Success)
            } else {
                Ok(SponsoredClaimStatus::InProgress)
            }
        })
    }
}

/// Leaf of a pre-existing bridge transaction
pub fn leaf(
    tx: H256,
    source_network: NetworkId,
    destination_network: NetworkId,
    deposit_count: u32,
    leaf_type: LeafType,
    amount: u64,
    calldata: &[u8],
) -> Deposit {
    Deposit {
        source_network,
        destination_network,
        deposit_count,
        leaf_type,
        origin_network: source_network,
        amount: U256::from(amount),
        calldata: Bytes::from(calldata.to_vec()),
        bridge_tx_hash: tx,
        block_num: 42,
        origin_address: Address::repeat_byte(0x11),
        destination_address: Address::repeat_byte(0x22),
        metadata: Bytes::from(calldata.to_vec()),
    }
}

/// Default budgets
pub fn config() -> ClaimerConfig {
    ClaimerConfig::default()
}
