//! Claim flow coordination
//!
//! A flow turns one bridge transaction into finalized claims:
//! 1. Discovers the deposit leg(s) on the source index
//! 2. Waits until the destination can have absorbed them
//! 3. Submits claims in dependency order (asset before message)
//! 4. Polls the destination index until each claim is terminal

pub mod discovery;
pub mod engine;
pub mod poller;
pub mod result;
pub mod sequencer;
pub mod sync;

pub use discovery::{DepositDiscovery, DiscoveredLegs};
pub use engine::FlowOrchestrator;
pub use poller::{ClaimQuery, ClaimState, ClaimStatusPoller, PollOutcome};
pub use result::{FlowResult, FlowStatus, FlowTimings, LegOutcome, LegReport};
pub use sequencer::{ClaimSequencer, SequenceStep};
pub use sync::SyncWaiter;

use crate::error::{ClaimerError, ClaimerResult};

use std::time::Duration;
use tokio::time::Instant;

/// Per-flow time budget shared by every wait and poll
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Fail with a timeout once the budget is spent
    pub fn check(&self, operation: &str) -> ClaimerResult<()> {
        if self.is_expired() {
            return Err(ClaimerError::Timeout {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Sleep for `duration`, or until the deadline if that comes first.
    ///
    /// Returns a timeout error when the sleep was cut short.
    pub async fn sleep(&self, duration: Duration, operation: &str) -> ClaimerResult<()> {
        let remaining = self.remaining();
        if duration < remaining {
            tokio::time::sleep(duration).await;
            return Ok(());
        }

        tokio::time::sleep(remaining).await;
        Err(ClaimerError::Timeout {
            operation: operation.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test(start_paused = true)]
    async fn sleep_within_budget() {
        let deadline = Deadline::after(Duration::from_secs(10));
        assert_ok!(deadline.sleep(Duration::from_secs(4), "test").await);
        assert_eq!(deadline.remaining(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_at_deadline() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let start = Instant::now();

        let err = assert_err!(deadline.sleep(Duration::from_secs(30), "sync wait").await);

        assert!(matches!(err, ClaimerError::Timeout { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(deadline.is_expired());
        assert_err!(deadline.check("poll"));
    }
}
