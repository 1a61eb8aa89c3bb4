//! Orders claims so a message leg never runs ahead of its asset leg

use super::discovery::DiscoveredLegs;
use super::result::LegOutcome;
use crate::error::{ClaimerError, ClaimerResult};
use crate::types::{Deposit, LegKind};

use tracing::debug;

/// What the orchestrator should do with the next leg
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceStep {
    Claim {
        kind: LegKind,
        deposit: Deposit,
    },
    Skip {
        kind: LegKind,
        deposit: Deposit,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegState {
    Waiting,
    InFlight,
    Satisfied,
    Unsatisfied,
}

struct SequencedLeg {
    deposit: Deposit,
    kind: LegKind,
    state: LegState,
}

/// Hands out legs one at a time in claim order.
///
/// Each leg depends on the one before it: a leg is only handed out as a claim
/// once its predecessor is recorded as completed or already claimed.
pub struct ClaimSequencer {
    legs: Vec<SequencedLeg>,
    cursor: usize,
    blocker: Option<String>,
}

impl ClaimSequencer {
    pub fn new(discovered: &DiscoveredLegs) -> Self {
        let legs = discovered
            .in_claim_order()
            .into_iter()
            .filter_map(|deposit| {
                deposit.leg_kind().map(|kind| SequencedLeg {
                    deposit,
                    kind,
                    state: LegState::Waiting,
                })
            })
            .collect();

        Self {
            legs,
            cursor: 0,
            blocker: None,
        }
    }

    /// Next step, or `None` once every leg has been handed out.
    ///
    /// Errors if the previous leg has not been recorded yet.
    pub fn next_step(&mut self) -> ClaimerResult<Option<SequenceStep>> {
        if let Some(prev) = self.cursor.checked_sub(1).and_then(|i| self.legs.get(i)) {
            if prev.state == LegState::InFlight {
                return Err(ClaimerError::Internal(format!(
                    "{} leg {} still in flight",
                    prev.kind, prev.deposit.deposit_count
                )));
            }
        }

        let Some(leg) = self.legs.get_mut(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        if let Some(reason) = &self.blocker {
            leg.state = LegState::Unsatisfied;
            debug!("Skipping {} leg {}: {}", leg.kind, leg.deposit.deposit_count, reason);
            return Ok(Some(SequenceStep::Skip {
                kind: leg.kind,
                deposit: leg.deposit.clone(),
                reason: reason.clone(),
            }));
        }

        leg.state = LegState::InFlight;
        Ok(Some(SequenceStep::Claim {
            kind: leg.kind,
            deposit: leg.deposit.clone(),
        }))
    }

    /// Record the terminal outcome of the in-flight leg
    pub fn record(&mut self, outcome: &LegOutcome) {
        let Some(leg) = self
            .cursor
            .checked_sub(1)
            .and_then(|i| self.legs.get_mut(i))
            .filter(|l| l.state == LegState::InFlight)
        else {
            return;
        };

        if outcome.satisfies_dependents() {
            leg.state = LegState::Satisfied;
        } else {
            leg.state = LegState::Unsatisfied;
            self.blocker
                .get_or_insert_with(|| format!("{} leg ended {}", leg.kind, outcome));
        }
    }

    /// Skip every remaining leg with `reason`
    pub fn abort(&mut self, reason: &str) {
        if let Some(leg) = self
            .cursor
            .checked_sub(1)
            .and_then(|i| self.legs.get_mut(i))
            .filter(|l| l.state == LegState::InFlight)
        {
            leg.state = LegState::Unsatisfied;
        }
        self.blocker.get_or_insert_with(|| reason.to_string());
    }

    pub(crate) fn len(&self) -> usize {
        self.legs.len()
    }
}
