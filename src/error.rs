//! Error types for the bridge claimer

use thiserror::Error;

/// Main error type for the claimer
#[derive(Error, Debug)]
pub enum ClaimerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network {network_id} not configured")]
    NetworkNotFound { network_id: u32 },

    #[error("RPC error on network {network_id}: {message}")]
    Rpc { network_id: u32, message: String },

    #[error("Indexer error on network {network_id}: {message}")]
    Indexer { network_id: u32, message: String },

    #[error("Malformed indexer record: {0}")]
    MalformedRecord(String),

    #[error("Deposit {bridge_tx_hash} not found on network {network_id}")]
    DepositNotFound {
        network_id: u32,
        bridge_tx_hash: String,
    },

    #[error("Invalid deposit pair for {bridge_tx_hash}: {reason}")]
    InvalidDepositPair {
        bridge_tx_hash: String,
        reason: String,
    },

    #[error("Deposit {deposit_count} from network {source_network} already claimed")]
    AlreadyClaimed {
        source_network: u32,
        deposit_count: u32,
    },

    #[error("Exit root not yet valid on network {network_id}: {message}")]
    ExitRootNotReady { network_id: u32, message: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClaimerError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClaimerError::ExitRootNotReady { .. }
                | ClaimerError::Rpc { .. }
                | ClaimerError::Indexer { .. }
                | ClaimerError::Timeout { .. }
        )
    }
}

/// Result type for claimer operations
pub type ClaimerResult<T> = Result<T, ClaimerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_errors_are_retryable() {
        let err = ClaimerError::ExitRootNotReady {
            network_id: 1,
            message: "GlobalExitRootInvalid".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn already_claimed_is_not_retryable() {
        let err = ClaimerError::AlreadyClaimed {
            source_network: 0,
            deposit_count: 4,
        };
        assert!(!err.is_retryable());
        assert!(!ClaimerError::Contract("revert".into()).is_retryable());
    }
}
