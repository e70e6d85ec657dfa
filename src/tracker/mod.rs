//! Chain-event polling and balance-change tracking.
//!
//! # Data Flow
//! ```text
//! provider new block
//!     → poller.rs (snapshot registry, fetch balances concurrently)
//!     → detector.rs (diff against cached balance, update cache)
//!     → scheduler.rs (deferred task keyed by wallet + block)
//!     → reconstructor.rs (explorer history, chronological, classified)
//!     → relay hub (NEW_TRANSACTION)
//! ```
//!
//! # Design Decisions
//! - Chains are independent: one poller each, no shared mutable state
//! - First observation is a baseline and never notifies
//! - Removal does not cancel timers; fired tasks re-check membership

pub mod detector;
pub mod error;
pub mod notification;
pub mod poller;
pub mod reconstructor;
pub mod registry;
pub mod scheduler;
pub mod service;

pub use detector::{BalanceChangeDetector, Observation};
pub use error::{TrackerError, TrackerResult};
pub use notification::{method_label, Direction, Notification};
pub use poller::{ChainPoller, PollSummary};
pub use reconstructor::{PendingReconstruction, TransactionReconstructor};
pub use registry::{BalanceUpdate, TrackedWallet, WalletRegistry};
pub use scheduler::ReconstructionScheduler;
pub use service::{AddedWallet, Tracker};
