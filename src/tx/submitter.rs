//! Claim submission with bounded retry on timing errors

use crate::chain::{ChainClient, ClaimRequest};
use crate::config::ClaimMode;
use crate::coordination::Deadline;
use crate::error::{ClaimerError, ClaimerResult};
use crate::metrics;

use ethers::types::{H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Upper bound on one submission, receipt included
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Outcome of one claim submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(H256),
    /// Accepted by the claim sponsor, tracked under this global index
    Sponsored(U256),
    /// Success for sequencing purposes
    AlreadyClaimed,
    /// The destination has not caught up yet; worth another attempt
    Retryable(String),
    Failed(String),
}

impl SubmitOutcome {
    fn label(&self) -> &'static str {
        match self {
            SubmitOutcome::Submitted(_) => "submitted",
            SubmitOutcome::Sponsored(_) => "sponsored",
            SubmitOutcome::AlreadyClaimed => "already_claimed",
            SubmitOutcome::Retryable(_) => "retryable",
            SubmitOutcome::Failed(_) => "failed",
        }
    }
}

/// Final outcome plus how many submissions it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReport {
    pub outcome: SubmitOutcome,
    pub attempts: u32,
}

/// Stateless wrapper around `ChainClient::submit_claim`, or
/// `ChainClient::sponsor_claim` in sponsored mode
pub struct ClaimSubmitter {
    client: Arc<dyn ChainClient>,
    max_attempts: u32,
    retry_delay: Duration,
    mode: ClaimMode,
}

impl ClaimSubmitter {
    pub fn new(client: Arc<dyn ChainClient>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            client,
            max_attempts,
            retry_delay,
            mode: ClaimMode::Direct,
        }
    }

    pub fn with_mode(mut self, mode: ClaimMode) -> Self {
        self.mode = mode;
        self
    }

    /// Submit one claim and classify the result
    pub async fn submit(&self, request: &ClaimRequest) -> SubmitOutcome {
        let sent = match self.mode {
            ClaimMode::Direct => timeout(SUBMIT_TIMEOUT, self.client.submit_claim(request))
                .await
                .map(|r| r.map(SubmitOutcome::Submitted)),
            ClaimMode::Sponsored => timeout(SUBMIT_TIMEOUT, self.client.sponsor_claim(request))
                .await
                .map(|r| r.map(SubmitOutcome::Sponsored)),
        };

        let outcome = match sent {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(ClaimerError::AlreadyClaimed { .. })) => SubmitOutcome::AlreadyClaimed,
            Ok(Err(e)) if e.is_retryable() => SubmitOutcome::Retryable(e.to_string()),
            Ok(Err(e)) => SubmitOutcome::Failed(e.to_string()),
            Err(_) => SubmitOutcome::Retryable(format!(
                "submission timed out after {}s",
                SUBMIT_TIMEOUT.as_secs()
            )),
        };

        metrics::record_claim_submission(request.destination_network, outcome.label());
        outcome
    }

    /// Submit, retrying `Retryable` outcomes after the configured delay.
    ///
    /// Once attempts are exhausted the last `Retryable` outcome is returned
    /// as is. Errors only when the flow deadline expires.
    pub async fn submit_with_retry(
        &self,
        request: &ClaimRequest,
        deadline: &Deadline,
    ) -> ClaimerResult<SubmitReport> {
        let mut attempts = 0;

        loop {
            deadline.check("claim submission")?;
            attempts += 1;

            let outcome = self.submit(request).await;
            match &outcome {
                SubmitOutcome::Submitted(tx_hash) => {
                    info!(
                        "Claim {:?} sent on network {} (attempt {}/{})",
                        tx_hash, request.destination_network, attempts, self.max_attempts
                    );
                }
                SubmitOutcome::Sponsored(global_index) => {
                    info!(
                        "Claim sponsor on network {} accepted global index {} (attempt {}/{})",
                        request.destination_network, global_index, attempts, self.max_attempts
                    );
                }
                SubmitOutcome::AlreadyClaimed => {
                    info!(
                        "Deposit {:?} from network {} already claimed",
                        request.target, request.source_network
                    );
                }
                SubmitOutcome::Retryable(reason) if attempts < self.max_attempts => {
                    warn!(
                        "Claim on network {} not ready (attempt {}/{}): {}",
                        request.destination_network, attempts, self.max_attempts, reason
                    );
                    deadline.sleep(self.retry_delay, "claim submission").await?;
                    continue;
                }
                SubmitOutcome::Retryable(reason) => {
                    warn!(
                        "Giving up on claim on network {} after {} attempts: {}",
                        request.destination_network, attempts, reason
                    );
                }
                SubmitOutcome::Failed(reason) => {
                    error!(
                        "Claim on network {} failed: {}",
                        request.destination_network, reason
                    );
                }
            }

            return Ok(SubmitReport { outcome, attempts });
        }
    }
}
