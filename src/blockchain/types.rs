//! Chain-specific types and error definitions.

use thiserror::Error;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during chain provider operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Address is not valid for this chain.
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Provider stopped or was never started.
    #[error("Blockchain not available: {0}")]
    NotAvailable(String),
}

/// Result type for chain provider operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Errors returned by the block explorer adapter.
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// Transport-level failure.
    #[error("Explorer request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The explorer answered with a non-success status.
    #[error("Explorer API error: {message} ({detail})")]
    Api { message: String, detail: String },

    /// No explorer endpoint configured for this chain.
    #[error("No explorer configured for chain {0}")]
    UnsupportedChain(u64),

    /// The explorer payload could not be decoded.
    #[error("Malformed explorer response: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_conversion() {
        let chain_id = ChainId::from(11_155_111u64);
        assert_eq!(chain_id.0, 11_155_111);
        assert_eq!(u64::from(chain_id), 11_155_111);
        assert_eq!(chain_id.to_string(), "11155111");
    }

    #[test]
    fn test_error_display() {
        let err = BlockchainError::Timeout(10);
        assert_eq!(err.to_string(), "RPC timeout after 10 seconds");

        let err = ExplorerError::UnsupportedChain(56);
        assert_eq!(err.to_string(), "No explorer configured for chain 56");
    }
}
