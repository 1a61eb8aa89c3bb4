//! Structured flow results

use crate::types::{LegKind, NetworkId, Topology};

use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use serde::Serialize;
use std::fmt;

/// Terminal outcome of one claim leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LegOutcome {
    /// The destination index reports the claim completed
    Completed,
    /// A previous run already claimed the deposit
    AlreadyClaimed,
    /// Submission failed or retries were exhausted
    Failed { reason: String },
    /// Submitted, but the claim never showed as completed within the poll budget
    Indeterminate,
    /// Never attempted
    Skipped { reason: String },
}

impl LegOutcome {
    /// Whether a dependent leg may proceed
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, LegOutcome::Completed | LegOutcome::AlreadyClaimed)
    }
}

impl fmt::Display for LegOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegOutcome::Completed => write!(f, "completed"),
            LegOutcome::AlreadyClaimed => write!(f, "already_claimed"),
            LegOutcome::Failed { reason } => write!(f, "failed ({})", reason),
            LegOutcome::Indeterminate => write!(f, "indeterminate"),
            LegOutcome::Skipped { reason } => write!(f, "skipped ({})", reason),
        }
    }
}

/// Per-leg section of a `FlowResult`
#[derive(Debug, Clone, Serialize)]
pub struct LegReport {
    pub kind: LegKind,
    pub deposit_count: u32,
    pub global_index: U256,
    pub outcome: LegOutcome,
    /// Claim transaction this run sent
    pub submitted_tx_hash: Option<H256>,
    /// Claim transaction the destination index reports
    pub claim_tx_hash: Option<H256>,
    pub submit_attempts: u32,
    pub elapsed_ms: u64,
}

/// Overall status of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// Every leg completed or was already claimed
    Completed,
    /// The expected legs never appeared on the source index
    DiscoveryFailed,
    /// At least one leg failed or was skipped because of a failure
    Failed,
    /// No leg failed, but at least one could not be confirmed
    Indeterminate,
    /// The flow deadline expired
    TimedOut,
}

impl FlowStatus {
    /// Fold per-leg outcomes into an overall status
    pub fn from_legs(legs: &[LegReport]) -> Self {
        if legs.is_empty() {
            return FlowStatus::Failed;
        }
        if legs.iter().all(|l| l.outcome.satisfies_dependents()) {
            return FlowStatus::Completed;
        }
        if legs
            .iter()
            .any(|l| matches!(l.outcome, LegOutcome::Failed { .. }))
        {
            return FlowStatus::Failed;
        }
        if legs
            .iter()
            .any(|l| l.outcome == LegOutcome::Indeterminate)
        {
            return FlowStatus::Indeterminate;
        }
        FlowStatus::Failed
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Completed => "completed",
            FlowStatus::DiscoveryFailed => "discovery_failed",
            FlowStatus::Failed => "failed",
            FlowStatus::Indeterminate => "indeterminate",
            FlowStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock breakdown of a flow
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowTimings {
    pub discovery_ms: u64,
    pub sync_wait_ms: u64,
    pub claims_ms: u64,
    pub total_ms: u64,
}

/// Report of one claim flow
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub bridge_tx_hash: H256,
    pub source_network: NetworkId,
    pub destination_network: NetworkId,
    pub topology: Topology,
    pub status: FlowStatus,
    pub legs: Vec<LegReport>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub timings: FlowTimings,
}

impl FlowResult {
    pub fn is_success(&self) -> bool {
        self.status == FlowStatus::Completed
    }

    /// Deposit counts of the claimed legs, in claim order
    pub fn deposit_counts(&self) -> Vec<u32> {
        self.legs.iter().map(|l| l.deposit_count).collect()
    }

    /// Terminal claim transaction hashes known for the flow
    pub fn claim_tx_hashes(&self) -> Vec<H256> {
        self.legs
            .iter()
            .filter_map(|l| l.claim_tx_hash.or(l.submitted_tx_hash))
            .collect()
    }

    pub fn leg(&self, kind: LegKind) -> Option<&LegReport> {
        self.legs.iter().find(|l| l.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(kind: LegKind, outcome: LegOutcome) -> LegReport {
        LegReport {
            kind,
            deposit_count: 0,
            global_index: U256::zero(),
            outcome,
            submitted_tx_hash: None,
            claim_tx_hash: None,
            submit_attempts: 1,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn already_claimed_counts_as_success() {
        let legs = vec![
            leg(LegKind::Asset, LegOutcome::AlreadyClaimed),
            leg(LegKind::Message, LegOutcome::Completed),
        ];
        assert_eq!(FlowStatus::from_legs(&legs), FlowStatus::Completed);
    }

    #[test]
    fn failure_outranks_indeterminate() {
        let legs = vec![
            leg(LegKind::Asset, LegOutcome::Indeterminate),
            leg(
                LegKind::Message,
                LegOutcome::Failed {
                    reason: "reverted".into(),
                },
            ),
        ];
        assert_eq!(FlowStatus::from_legs(&legs), FlowStatus::Failed);
    }

    #[test]
    fn indeterminate_asset_with_skipped_message() {
        let legs = vec![
            leg(LegKind::Asset, LegOutcome::Indeterminate),
            leg(
                LegKind::Message,
                LegOutcome::Skipped {
                    reason: "asset leg indeterminate".into(),
                },
            ),
        ];
        assert_eq!(FlowStatus::from_legs(&legs), FlowStatus::Indeterminate);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(LegOutcome::Failed {
            reason: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"], "boom");
    }
}
