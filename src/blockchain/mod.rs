//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! ChainConfig (RPC URL, failovers, explorer URL)
//!     → provider.rs (balances, new-block stream with reconnection)
//!     → explorer.rs (transaction history, newest-first)
//! ```
//!
//! # Constraints
//! - Read-only: nothing here signs or sends transactions
//! - All RPC calls have configurable timeouts
//! - Graceful degradation when a chain or explorer is unreachable

pub mod address;
pub mod explorer;
pub mod provider;
pub mod types;

pub use address::{normalize_address, same_address};
pub use explorer::{BlockExplorer, EtherscanExplorer, ExplorerTransaction};
pub use provider::{AlloyChainProvider, BlockSubscription, ChainProvider};
pub use types::{BlockchainError, BlockchainResult, ChainId, ExplorerError};
