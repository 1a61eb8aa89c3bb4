//! End-to-end claim flows against the scripted in-memory chain

mod common;

use common::{config, leaf, ChainEvent, FakeChain};

use bridge_claimer::chain::{ChainClient, DepositLeg, DepositRequest};
use bridge_claimer::config::{ClaimMode, ClaimerConfig, SyncProfiles};
use bridge_claimer::coordination::{FlowOrchestrator, FlowStatus, LegOutcome};
use bridge_claimer::types::{LeafType, LegKind, Topology};

use ethers::types::{Address, Bytes, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const TX: H256 = H256::repeat_byte(0x77);

fn orchestrator(chain: &Arc<FakeChain>, config: ClaimerConfig) -> FlowOrchestrator {
    let client: Arc<dyn ChainClient> = chain.clone();
    FlowOrchestrator::new(client, config, SyncProfiles::default())
}

fn seed_bridge_and_call(chain: &FakeChain, tx: H256) {
    chain.seed_deposit(leaf(tx, 0, 1, 4, LeafType::Asset, 10, &[]));
    chain.seed_deposit(leaf(tx, 0, 1, 5, LeafType::Message, 0, &[0xca, 0xfe]));
}

#[tokio::test(start_paused = true)]
async fn single_asset_deposit_is_claimed() {
    let chain = Arc::new(FakeChain::new());
    let orchestrator = orchestrator(&chain, config());

    let request = DepositRequest {
        source_network: 0,
        destination_network: 1,
        leg: DepositLeg::Asset {
            token: Address::zero(),
            amount: U256::from(50),
            destination_address: Address::repeat_byte(0x22),
        },
    };
    let result = orchestrator
        .submit_and_claim(request, Topology::Asset)
        .await
        .unwrap();

    assert_eq!(result.status, FlowStatus::Completed);
    assert_eq!(result.legs.len(), 1);
    let leg = result.leg(LegKind::Asset).unwrap();
    assert_eq!(leg.outcome, LegOutcome::Completed);
    assert_eq!(leg.submit_attempts, 1);
    assert!(leg.claim_tx_hash.is_some());
    assert!(matches!(chain.events()[0], ChainEvent::DepositSubmitted(_)));
}

#[tokio::test(start_paused = true)]
async fn bridge_and_call_claims_asset_before_message() {
    let chain = Arc::new(FakeChain::new());
    seed_bridge_and_call(&chain, TX);
    chain.complete_claims_after(2);
    let orchestrator = orchestrator(&chain, config());

    let result = orchestrator
        .run_claim_flow(TX, 0, 1, Topology::AssetAndMessage)
        .await;

    assert_eq!(result.status, FlowStatus::Completed);
    assert_eq!(result.deposit_counts(), vec![4, 5]);
    assert_eq!(result.claim_tx_hashes().len(), 2);
    assert_eq!(
        chain.events(),
        vec![
            ChainEvent::ClaimSubmitted(4),
            ChainEvent::ClaimCompleted(4),
            ChainEvent::ClaimSubmitted(5),
            ChainEvent::ClaimCompleted(5),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn bridge_and_call_is_not_complete_unless_both_polls_succeed() {
    let chain = Arc::new(FakeChain::new());
    seed_bridge_and_call(&chain, TX);
    chain.stick_claim(5);
    let orchestrator = orchestrator(&chain, config());

    let result = orchestrator
        .run_claim_flow(TX, 0, 1, Topology::AssetAndMessage)
        .await;

    assert_eq!(result.status, FlowStatus::Indeterminate);
    assert_eq!(
        result.leg(LegKind::Asset).unwrap().outcome,
        LegOutcome::Completed
    );
    assert_eq!(
        result.leg(LegKind::Message).unwrap().outcome,
        LegOutcome::Indeterminate
    );
}

#[tokio::test(start_paused = true)]
async fn deposit_claimed_by_prior_run_is_a_success() {
    let chain = Arc::new(FakeChain::new());
    chain.seed_deposit(leaf(TX, 0, 1, 9, LeafType::Asset, 50, &[]));
    chain.mark_claimed(0, 9);
    let orchestrator = orchestrator(&chain, config());

    let result = orchestrator.run_claim_flow(TX, 0, 1, Topology::Asset).await;

    assert_eq!(result.status, FlowStatus::Completed);
    assert_eq!(result.legs[0].outcome, LegOutcome::AlreadyClaimed);
    assert!(result.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn exhausted_discovery_window_attempts_no_claim() {
    let chain = Arc::new(FakeChain::new());
    let orchestrator = orchestrator(&chain, config());
    let start = Instant::now();

    let result = orchestrator.run_claim_flow(TX, 0, 1, Topology::Asset).await;

    assert_eq!(result.status, FlowStatus::DiscoveryFailed);
    assert!(result.legs.is_empty());
    assert!(chain.submitted_claims().is_empty());
    assert!(result.error.is_some());
    // 6 attempts, 3s apart
    assert_eq!(start.elapsed(), Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn late_indexing_is_absorbed_by_discovery() {
    let chain = Arc::new(FakeChain::new());
    chain.seed_deposit(leaf(TX, 1, 0, 3, LeafType::Message, 0, &[0x01]));
    chain.hide_deposits_for(4);
    let orchestrator = orchestrator(&chain, config());

    let result = orchestrator.run_claim_flow(TX, 1, 0, Topology::Message).await;

    assert_eq!(result.status, FlowStatus::Completed);
    assert_eq!(result.timings.discovery_ms, 12_000);
    assert_eq!(result.timings.sync_wait_ms, 20_000);
}

#[tokio::test(start_paused = true)]
async fn exit_root_timing_errors_are_retried() {
    let chain = Arc::new(FakeChain::new());
    chain.seed_deposit(leaf(TX, 1, 2, 0, LeafType::Asset, 5, &[]));
    chain.exit_root_not_ready_for(2);
    let orchestrator = orchestrator(&chain, config());

    let result = orchestrator.run_claim_flow(TX, 1, 2, Topology::Asset).await;

    assert_eq!(result.status, FlowStatus::Completed);
    assert_eq!(result.legs[0].submit_attempts, 3);
    assert_eq!(chain.submitted_claims(), vec![0, 0, 0]);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_bounded() {
    let chain = Arc::new(FakeChain::new());
    chain.seed_deposit(leaf(TX, 0, 1, 1, LeafType::Asset, 5, &[]));
    chain.exit_root_not_ready_for(10);
    let orchestrator = orchestrator(&chain, config());

    let result = orchestrator.run_claim_flow(TX, 0, 1, Topology::Asset).await;

    assert_eq!(result.status, FlowStatus::Failed);
    assert_eq!(chain.submitted_claims().len(), 3);
    assert!(matches!(
        result.legs[0].outcome,
        LegOutcome::Failed { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn asset_failure_skips_message_leg() {
    let chain = Arc::new(FakeChain::new());
    seed_bridge_and_call(&chain, TX);
    chain.fail_claim(4);
    let orchestrator = orchestrator(&chain, config());

    let result = orchestrator
        .run_claim_flow(TX, 0, 1, Topology::AssetAndMessage)
        .await;

    assert_eq!(result.status, FlowStatus::Failed);
    assert_eq!(chain.submitted_claims(), vec![4]);
    assert!(matches!(
        result.leg(LegKind::Message).unwrap().outcome,
        LegOutcome::Skipped { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn flow_deadline_ends_a_stuck_flow() {
    let chain = Arc::new(FakeChain::new());
    chain.seed_deposit(leaf(TX, 0, 1, 2, LeafType::Asset, 5, &[]));
    chain.stick_claim(2);
    let orchestrator = orchestrator(
        &chain,
        ClaimerConfig {
            flow_deadline_secs: 50,
            ..config()
        },
    );
    let start = Instant::now();

    let result = orchestrator.run_claim_flow(TX, 0, 1, Topology::Asset).await;

    assert_eq!(result.status, FlowStatus::TimedOut);
    assert_eq!(result.legs[0].outcome, LegOutcome::Indeterminate);
    assert!(start.elapsed() <= Duration::from_secs(50));
}

#[tokio::test(start_paused = true)]
async fn l2_to_l2_message_claim_is_matched_by_fields_despite_reported_type() {
    let chain = Arc::new(FakeChain::new());
    chain.omit_claim_hashes();
    let orchestrator = orchestrator(&chain, config());

    let request = DepositRequest {
        source_network: 1,
        destination_network: 2,
        leg: DepositLeg::Message {
            destination_address: Address::repeat_byte(0x33),
            value: U256::zero(),
            metadata: Bytes::from(vec![0xbe, 0xef]),
        },
    };
    let result = orchestrator
        .submit_and_claim(request, Topology::Message)
        .await
        .unwrap();

    assert_eq!(result.status, FlowStatus::Completed);
    assert_eq!(result.timings.sync_wait_ms, 90_000);
    let leg = result.leg(LegKind::Message).unwrap();
    assert_eq!(leg.outcome, LegOutcome::Completed);
    assert!(leg.submitted_tx_hash.is_some());
    assert_eq!(leg.claim_tx_hash, None);
}

#[tokio::test(start_paused = true)]
async fn sponsored_bridge_and_call_is_tracked_to_completion() {
    let chain = Arc::new(FakeChain::new());
    seed_bridge_and_call(&chain, TX);
    chain.complete_claims_after(2);
    chain.exit_root_not_ready_for(1);
    let orchestrator = orchestrator(
        &chain,
        ClaimerConfig {
            claim_mode: ClaimMode::Sponsored,
            ..config()
        },
    );

    let result = orchestrator
        .run_claim_flow(TX, 0, 1, Topology::AssetAndMessage)
        .await;

    assert_eq!(result.status, FlowStatus::Completed);
    assert!(chain.submitted_claims().is_empty());
    assert_eq!(
        chain.events(),
        vec![
            ChainEvent::ClaimSponsored(4),
            ChainEvent::ClaimCompleted(4),
            ChainEvent::ClaimSponsored(5),
            ChainEvent::ClaimCompleted(5),
        ]
    );
    let asset = result.leg(LegKind::Asset).unwrap();
    assert_eq!(asset.submit_attempts, 2);
    assert_eq!(asset.submitted_tx_hash, None);
}

#[tokio::test(start_paused = true)]
async fn sponsor_failure_skips_message_leg() {
    let chain = Arc::new(FakeChain::new());
    seed_bridge_and_call(&chain, TX);
    chain.fail_claim(4);
    let orchestrator = orchestrator(
        &chain,
        ClaimerConfig {
            claim_mode: ClaimMode::Sponsored,
            ..config()
        },
    );

    let result = orchestrator
        .run_claim_flow(TX, 0, 1, Topology::AssetAndMessage)
        .await;

    assert_eq!(result.status, FlowStatus::Failed);
    assert!(matches!(
        result.leg(LegKind::Asset).unwrap().outcome,
        LegOutcome::Failed { .. }
    ));
    assert!(matches!(
        result.leg(LegKind::Message).unwrap().outcome,
        LegOutcome::Skipped { .. }
    ));
    assert_eq!(chain.events(), vec![ChainEvent::ClaimSponsored(4)]);
}

#[tokio::test(start_paused = true)]
async fn independent_flows_share_one_client() {
    let chain = Arc::new(FakeChain::new());
    let orchestrator = Arc::new(orchestrator(&chain, config()));

    let asset = DepositRequest {
        source_network: 0,
        destination_network: 1,
        leg: DepositLeg::Asset {
            token: Address::zero(),
            amount: U256::from(7),
            destination_address: Address::repeat_byte(0x22),
        },
    };
    let bridge_and_call = DepositRequest {
        source_network: 0,
        destination_network: 1,
        leg: DepositLeg::AssetAndMessage {
            token: Address::zero(),
            amount: U256::from(10),
            call_address: Address::repeat_byte(0x44),
            fallback_address: Address::repeat_byte(0x22),
            calldata: Bytes::from(vec![0x12, 0x34]),
        },
    };

    let a = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.submit_and_claim(asset, Topology::Asset).await }
    });
    let b = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .submit_and_claim(bridge_and_call, Topology::AssetAndMessage)
                .await
        }
    });

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert!(a.is_success());
    assert!(b.is_success());
    assert_eq!(b.deposit_counts(), vec![1, 2]);
    assert_ne!(a.bridge_tx_hash, b.bridge_tx_hash);
}
