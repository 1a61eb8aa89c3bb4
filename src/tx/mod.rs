//! Claim transaction submission

mod submitter;

pub use submitter::{ClaimSubmitter, SubmitOutcome, SubmitReport};
