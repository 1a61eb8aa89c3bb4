//! Claim status polling against the destination claim index

use super::Deadline;
use crate::chain::ChainClient;
use crate::error::ClaimerResult;
use crate::metrics;
use crate::types::{Claim, Deposit, LegKind, NetworkId, SponsoredClaimStatus};

use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the poller knows about one claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    Unknown,
    NotFoundYet,
    Pending,
    Completed,
}

/// Terminal result of polling one claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { claim_tx_hash: Option<H256> },
    /// The claim sponsor gave up on the claim
    Rejected { reason: String },
    /// Budget exhausted; never treated as success
    TimedOut { last_state: ClaimState },
}

/// Correlation keys for finding a leg's claim on the destination index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimQuery {
    pub kind: LegKind,
    pub origin_network: NetworkId,
    pub destination_network: NetworkId,
    pub global_index: U256,
    pub bridge_tx_hash: H256,
    pub claim_tx_hash: Option<H256>,
    pub origin_address: Address,
    pub destination_address: Address,
    pub amount: U256,
    /// Track the claim through the destination's claim sponsor
    pub sponsored: bool,
}

impl ClaimQuery {
    pub fn for_deposit(kind: LegKind, deposit: &Deposit, claim_tx_hash: Option<H256>) -> Self {
        Self {
            kind,
            origin_network: deposit.origin_network,
            destination_network: deposit.destination_network,
            global_index: deposit.global_index(),
            bridge_tx_hash: deposit.bridge_tx_hash,
            claim_tx_hash,
            origin_address: deposit.origin_address,
            destination_address: deposit.destination_address,
            amount: deposit.amount,
            sponsored: false,
        }
    }

    /// Query for a claim handed to the claim sponsor
    pub fn sponsored(kind: LegKind, deposit: &Deposit) -> Self {
        Self {
            sponsored: true,
            ..Self::for_deposit(kind, deposit, None)
        }
    }

    /// Find this leg's claim among `claims`.
    ///
    /// Keys in order: claim tx hash, global index, then the leg's field tuple.
    /// The index's claim `type` is never consulted.
    pub fn find<'a>(&self, claims: &'a [Claim]) -> Option<&'a Claim> {
        if let Some(hash) = self.claim_tx_hash {
            if let Some(claim) = claims.iter().find(|c| c.claim_tx_hash == Some(hash)) {
                return Some(claim);
            }
        }

        if let Some(claim) = prefer_completed(claims.iter().filter(|c| {
            c.destination_network == self.destination_network
                && c.global_index == Some(self.global_index)
        })) {
            return Some(claim);
        }

        prefer_completed(claims.iter().filter(|c| self.matches_fields(c)))
    }

    fn matches_fields(&self, claim: &Claim) -> bool {
        // identifiers that disagree mean another deposit, or another run's claim
        if claim.global_index.is_some_and(|g| g != self.global_index) {
            return false;
        }
        if claim.bridge_tx_hash.is_some_and(|h| h != self.bridge_tx_hash) {
            return false;
        }
        if self.claim_tx_hash.is_some() && claim.claim_tx_hash.is_some() {
            return false;
        }
        if claim.origin_network != self.origin_network
            || claim.destination_network != self.destination_network
        {
            return false;
        }

        match self.kind {
            LegKind::Asset => {
                claim.origin_address == self.origin_address
                    && claim.destination_address == self.destination_address
                    && claim.amount == self.amount
            }
            LegKind::Message => {
                claim.destination_address == self.destination_address && claim.amount.is_zero()
            }
        }
    }
}

fn prefer_completed<'a>(matches: impl Iterator<Item = &'a Claim>) -> Option<&'a Claim> {
    let mut first = None;
    for claim in matches {
        if claim.is_completed() {
            return Some(claim);
        }
        first.get_or_insert(claim);
    }
    first
}

/// One poll's reading
enum Observation {
    Completed(Option<H256>),
    Rejected(String),
    Waiting(ClaimState),
}

pub struct ClaimStatusPoller {
    client: Arc<dyn ChainClient>,
    attempts: u32,
    interval: Duration,
}

impl ClaimStatusPoller {
    pub fn new(client: Arc<dyn ChainClient>, attempts: u32, interval: Duration) -> Self {
        Self {
            client,
            attempts,
            interval,
        }
    }

    /// Poll until the claim completes or the attempt budget runs out.
    ///
    /// Errors only when the flow deadline expires first.
    pub async fn poll(&self, query: &ClaimQuery, deadline: &Deadline) -> ClaimerResult<PollOutcome> {
        let mut state = ClaimState::Unknown;

        for attempt in 1..=self.attempts {
            deadline.check("claim status poll")?;

            let observed = if query.sponsored {
                self.observe_sponsor(query).await
            } else {
                self.observe_index(query).await
            };

            match observed {
                Ok(Observation::Completed(claim_tx_hash)) => {
                    info!(
                        "{} claim on network {} completed (tx {:?})",
                        query.kind, query.destination_network, claim_tx_hash
                    );
                    metrics::record_claim_completed(query.destination_network, query.kind);
                    return Ok(PollOutcome::Completed { claim_tx_hash });
                }
                Ok(Observation::Rejected(reason)) => {
                    warn!(
                        "{} claim on network {} rejected: {}",
                        query.kind, query.destination_network, reason
                    );
                    return Ok(PollOutcome::Rejected { reason });
                }
                Ok(Observation::Waiting(observed)) => state = observed,
                Err(e) => warn!(
                    "Claim query on network {} failed (attempt {}/{}): {}",
                    query.destination_network, attempt, self.attempts, e
                ),
            }

            debug!(
                "{} claim on network {}: {:?} after attempt {}/{}",
                query.kind, query.destination_network, state, attempt, self.attempts
            );

            if attempt < self.attempts {
                deadline.sleep(self.interval, "claim status poll").await?;
            }
        }

        warn!(
            "{} claim on network {} not completed after {} polls (last state {:?})",
            query.kind, query.destination_network, self.attempts, state
        );
        metrics::record_poll_timeout(query.destination_network, query.kind);
        Ok(PollOutcome::TimedOut { last_state: state })
    }

    async fn observe_index(&self, query: &ClaimQuery) -> ClaimerResult<Observation> {
        let claims = self.client.query_claims(query.destination_network).await?;
        Ok(match query.find(&claims) {
            Some(claim) if claim.is_completed() => {
                Observation::Completed(claim.claim_tx_hash.or(query.claim_tx_hash))
            }
            Some(_) => Observation::Waiting(ClaimState::Pending),
            None => Observation::Waiting(ClaimState::NotFoundYet),
        })
    }

    /// The sponsor does not report its transaction hash
    async fn observe_sponsor(&self, query: &ClaimQuery) -> ClaimerResult<Observation> {
        let status = self
            .client
            .sponsored_claim_status(query.destination_network, query.global_index)
            .await?;
        Ok(match status {
            SponsoredClaimStatus::Success => Observation::Completed(None),
            SponsoredClaimStatus::Failed => Observation::Rejected(format!(
                "claim sponsor failed global index {}",
                query.global_index
            )),
            SponsoredClaimStatus::InProgress | SponsoredClaimStatus::Pending => {
                Observation::Waiting(ClaimState::Pending)
            }
        })
    }
}
