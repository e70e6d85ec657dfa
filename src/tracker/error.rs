//! Tracker error definitions.

use thiserror::Error;

use crate::blockchain::BlockchainError;

/// Errors returned to callers of tracker and registry operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The chain is not configured in this process.
    #[error("Chain not found: {0}")]
    UnknownChain(u64),

    /// The chain provider rejected the request.
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
}

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;
