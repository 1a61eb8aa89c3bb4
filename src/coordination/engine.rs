//! Flow orchestrator: discovery, sync wait, sequenced claims and polling

use super::discovery::DepositDiscovery;
use super::poller::{ClaimQuery, ClaimStatusPoller, PollOutcome};
use super::result::{FlowResult, FlowStatus, FlowTimings, LegOutcome, LegReport};
use super::sequencer::{ClaimSequencer, SequenceStep};
use super::sync::SyncWaiter;
use super::Deadline;
use crate::chain::{ChainClient, ClaimRequest, DepositRequest};
use crate::config::{ClaimerConfig, SyncProfiles};
use crate::error::{ClaimerError, ClaimerResult};
use crate::metrics;
use crate::tx::{ClaimSubmitter, SubmitOutcome};
use crate::types::{Deposit, LegKind, NetworkId, PairClass, Topology};

use chrono::{DateTime, Utc};
use ethers::types::H256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

const DEADLINE_EXPIRED: &str = "flow deadline expired";

/// Runs claim flows against a shared chain client.
///
/// One flow is strictly sequential; independent flows may run concurrently
/// on the same orchestrator.
pub struct FlowOrchestrator {
    client: Arc<dyn ChainClient>,
    config: ClaimerConfig,
    discovery: DepositDiscovery,
    sync: SyncWaiter,
    submitter: ClaimSubmitter,
    poller: ClaimStatusPoller,
}

impl FlowOrchestrator {
    pub fn new(client: Arc<dyn ChainClient>, config: ClaimerConfig, profiles: SyncProfiles) -> Self {
        let discovery = DepositDiscovery::new(
            client.clone(),
            config.discovery_attempts,
            config.discovery_interval(),
        );
        let sync = SyncWaiter::new(
            client.clone(),
            profiles,
            config.sync_mode,
            config.discovery_interval(),
        );
        let submitter = ClaimSubmitter::new(
            client.clone(),
            config.submit_max_attempts,
            config.submit_retry_delay(),
        )
        .with_mode(config.claim_mode);
        let poller =
            ClaimStatusPoller::new(client.clone(), config.poll_attempts, config.poll_interval());

        Self {
            client,
            config,
            discovery,
            sync,
            submitter,
            poller,
        }
    }

    /// Deadline budget for a flow on this pair and leg set
    pub fn flow_deadline(
        &self,
        source_network: NetworkId,
        destination_network: NetworkId,
        topology: Topology,
    ) -> Duration {
        let sync_wait = self
            .sync
            .fixed_wait(source_network, destination_network, topology);
        self.config
            .flow_deadline(sync_wait, topology.expected_legs().len())
    }

    /// Submit a deposit, then claim it
    pub async fn submit_and_claim(
        &self,
        request: DepositRequest,
        topology: Topology,
    ) -> ClaimerResult<FlowResult> {
        if request.leg.topology() != topology {
            return Err(ClaimerError::Config(format!(
                "{} deposit cannot be claimed as a {} flow",
                request.leg.topology(),
                topology
            )));
        }

        let bridge_tx_hash = self.client.submit_deposit(&request).await?;
        Ok(self
            .run_claim_flow(
                bridge_tx_hash,
                request.source_network,
                request.destination_network,
                topology,
            )
            .await)
    }

    /// Turn an emitted bridge transaction into finalized claims
    pub async fn run_claim_flow(
        &self,
        bridge_tx_hash: H256,
        source_network: NetworkId,
        destination_network: NetworkId,
        topology: Topology,
    ) -> FlowResult {
        let mut run = FlowRun {
            bridge_tx_hash,
            source_network,
            destination_network,
            topology,
            started_at: Utc::now(),
            start: Instant::now(),
            timings: FlowTimings::default(),
        };
        let budget = self.flow_deadline(source_network, destination_network, topology);
        let deadline = Deadline::after(budget);

        info!(
            "Starting {} flow for {:?}: network {} -> {} (deadline {}s)",
            topology,
            bridge_tx_hash,
            source_network,
            destination_network,
            budget.as_secs()
        );

        // 1. Discovery
        let phase = Instant::now();
        let discovered = self
            .discovery
            .discover(
                bridge_tx_hash,
                source_network,
                destination_network,
                topology,
                &deadline,
            )
            .await;
        run.timings.discovery_ms = elapsed_ms(phase);

        let discovered = match discovered {
            Ok(legs) => legs,
            Err(e @ ClaimerError::Timeout { .. }) => {
                return run.finish(FlowStatus::TimedOut, Vec::new(), Some(e.to_string()));
            }
            Err(e) => {
                error!("Discovery failed for {:?}: {}", bridge_tx_hash, e);
                return run.finish(FlowStatus::DiscoveryFailed, Vec::new(), Some(e.to_string()));
            }
        };
        let mut sequencer = ClaimSequencer::new(&discovered);

        // 2. Sync wait
        let phase = Instant::now();
        let waited = self
            .sync
            .wait(
                &discovered.in_claim_order(),
                destination_network,
                topology,
                &deadline,
            )
            .await;
        run.timings.sync_wait_ms = elapsed_ms(phase);

        if let Err(e) = waited {
            sequencer.abort(DEADLINE_EXPIRED);
            let legs = drain_skipped(&mut sequencer);
            return run.finish(FlowStatus::TimedOut, legs, Some(e.to_string()));
        }

        // 3-4. Sequenced claims, each polled to a terminal state
        let phase = Instant::now();
        let mut legs = Vec::with_capacity(sequencer.len());
        let mut timed_out = false;
        let mut flow_error = None;

        loop {
            let step = match sequencer.next_step() {
                Ok(Some(step)) => step,
                Ok(None) => break,
                Err(e) => {
                    error!("Claim sequencing error for {:?}: {}", bridge_tx_hash, e);
                    flow_error = Some(e.to_string());
                    break;
                }
            };

            match step {
                SequenceStep::Skip {
                    kind,
                    deposit,
                    reason,
                } => {
                    warn!(
                        "Skipping {} leg {} of {:?}: {}",
                        kind, deposit.deposit_count, bridge_tx_hash, reason
                    );
                    legs.push(skipped_report(kind, &deposit, reason));
                }
                SequenceStep::Claim { kind, deposit } => {
                    let (report, expired) = self.claim_leg(kind, &deposit, &deadline).await;
                    if expired {
                        timed_out = true;
                        flow_error.get_or_insert_with(|| DEADLINE_EXPIRED.to_string());
                        sequencer.abort(DEADLINE_EXPIRED);
                    } else {
                        sequencer.record(&report.outcome);
                    }
                    legs.push(report);
                }
            }
        }
        run.timings.claims_ms = elapsed_ms(phase);

        let status = if timed_out {
            FlowStatus::TimedOut
        } else {
            FlowStatus::from_legs(&legs)
        };
        run.finish(status, legs, flow_error)
    }

    /// Submit and poll one leg. The flag reports a deadline expiry.
    async fn claim_leg(
        &self,
        kind: LegKind,
        deposit: &Deposit,
        deadline: &Deadline,
    ) -> (LegReport, bool) {
        let start = Instant::now();
        let mut report = LegReport {
            kind,
            deposit_count: deposit.deposit_count,
            global_index: deposit.global_index(),
            outcome: LegOutcome::Indeterminate,
            submitted_tx_hash: None,
            claim_tx_hash: None,
            submit_attempts: 0,
            elapsed_ms: 0,
        };

        info!(
            "Claiming {} leg {} from network {} on network {}",
            kind, deposit.deposit_count, deposit.source_network, deposit.destination_network
        );

        let request = ClaimRequest::for_deposit(deposit);
        let submitted = match self.submitter.submit_with_retry(&request, deadline).await {
            Ok(submitted) => submitted,
            Err(e) => {
                report.outcome = LegOutcome::Failed {
                    reason: e.to_string(),
                };
                report.elapsed_ms = elapsed_ms(start);
                return (report, true);
            }
        };
        report.submit_attempts = submitted.attempts;

        let mut expired = false;
        let outcome = match submitted.outcome {
            SubmitOutcome::AlreadyClaimed => LegOutcome::AlreadyClaimed,
            SubmitOutcome::Failed(reason) => LegOutcome::Failed { reason },
            SubmitOutcome::Retryable(reason) => LegOutcome::Failed {
                reason: format!(
                    "not claimable after {} attempts: {}",
                    submitted.attempts, reason
                ),
            },
            SubmitOutcome::Submitted(tx_hash) => {
                report.submitted_tx_hash = Some(tx_hash);
                let query = ClaimQuery::for_deposit(kind, deposit, Some(tx_hash));
                let (outcome, poll_expired) = self.await_claim(&query, &mut report, deadline).await;
                expired = poll_expired;
                outcome
            }
            SubmitOutcome::Sponsored(_) => {
                let query = ClaimQuery::sponsored(kind, deposit);
                let (outcome, poll_expired) = self.await_claim(&query, &mut report, deadline).await;
                expired = poll_expired;
                outcome
            }
        };
        report.outcome = outcome;
        report.elapsed_ms = elapsed_ms(start);
        info!(
            "{} leg {} ended {} after {}ms",
            kind, deposit.deposit_count, report.outcome, report.elapsed_ms
        );
        (report, expired)
    }

    /// Poll a sent claim to a terminal outcome. The flag reports a deadline expiry.
    async fn await_claim(
        &self,
        query: &ClaimQuery,
        report: &mut LegReport,
        deadline: &Deadline,
    ) -> (LegOutcome, bool) {
        match self.poller.poll(query, deadline).await {
            Ok(PollOutcome::Completed { claim_tx_hash }) => {
                report.claim_tx_hash = claim_tx_hash;
                (LegOutcome::Completed, false)
            }
            Ok(PollOutcome::Rejected { reason }) => (LegOutcome::Failed { reason }, false),
            Ok(PollOutcome::TimedOut { .. }) => (LegOutcome::Indeterminate, false),
            Err(_) => (LegOutcome::Indeterminate, true),
        }
    }
}

/// Bookkeeping for one in-progress flow
struct FlowRun {
    bridge_tx_hash: H256,
    source_network: NetworkId,
    destination_network: NetworkId,
    topology: Topology,
    started_at: DateTime<Utc>,
    start: Instant,
    timings: FlowTimings,
}

impl FlowRun {
    fn finish(
        mut self,
        status: FlowStatus,
        legs: Vec<LegReport>,
        error: Option<String>,
    ) -> FlowResult {
        self.timings.total_ms = elapsed_ms(self.start);

        let pair = PairClass::of(self.source_network, self.destination_network);
        metrics::record_flow_outcome(status);
        metrics::record_flow_latency(pair, self.start.elapsed().as_secs_f64());

        if status == FlowStatus::Completed {
            info!(
                "Flow for {:?} completed in {}ms",
                self.bridge_tx_hash, self.timings.total_ms
            );
        } else {
            warn!(
                "Flow for {:?} ended {} after {}ms{}",
                self.bridge_tx_hash,
                status,
                self.timings.total_ms,
                error.as_deref().map(|e| format!(": {}", e)).unwrap_or_default()
            );
        }

        FlowResult {
            bridge_tx_hash: self.bridge_tx_hash,
            source_network: self.source_network,
            destination_network: self.destination_network,
            topology: self.topology,
            status,
            legs,
            error,
            started_at: self.started_at,
            finished_at: Utc::now(),
            timings: self.timings,
        }
    }
}

fn skipped_report(kind: LegKind, deposit: &Deposit, reason: String) -> LegReport {
    LegReport {
        kind,
        deposit_count: deposit.deposit_count,
        global_index: deposit.global_index(),
        outcome: LegOutcome::Skipped { reason },
        submitted_tx_hash: None,
        claim_tx_hash: None,
        submit_attempts: 0,
        elapsed_ms: 0,
    }
}

/// Report every remaining leg of an aborted sequencer as skipped
fn drain_skipped(sequencer: &mut ClaimSequencer) -> Vec<LegReport> {
    let mut legs = Vec::new();
    while let Ok(Some(SequenceStep::Skip {
        kind,
        deposit,
        reason,
    })) = sequencer.next_step()
    {
        legs.push(skipped_report(kind, &deposit, reason));
    }
    legs
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
