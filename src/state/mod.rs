//! In-memory flow state
//!
//! Deposits and claims are rebuilt from the indexes on every flow; the only
//! state kept is the registry of flows this process has run.

mod registry;

pub use registry::{FlowRecord, FlowRegistry, FlowRequest, FlowState, FlowStats};
