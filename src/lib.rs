//! Bridge Claimer - turns cross-network bridge deposits into finalized claims
//!
//! A claim flow discovers the leg(s) a bridge transaction emitted on its
//! source network, waits for the destination network to absorb them, submits
//! the claims in dependency order and polls the destination index until each
//! claim is terminal.

pub mod api;
pub mod chain;
pub mod config;
pub mod coordination;
pub mod error;
pub mod metrics;
pub mod state;
pub mod tx;
pub mod types;

pub use chain::{BridgeChainClient, ChainClient, ClaimRequest, DepositLeg, DepositRequest};
pub use config::Settings;
pub use coordination::{FlowOrchestrator, FlowResult, FlowStatus, LegOutcome};
pub use error::{ClaimerError, ClaimerResult};
pub use types::{Claim, Deposit, LegKind, NetworkId, Topology};
