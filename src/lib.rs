//! Wallet balance tracker.
//!
//! Polls tracked wallets on every new block, reconstructs the transactions
//! behind each balance change from a block explorer after an indexing delay,
//! and relays the resulting notifications to a subscriber-facing peer.

// Core subsystems
pub mod blockchain;
pub mod config;
pub mod relay;
pub mod tracker;

// Subscriber-facing peer
pub mod peer;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{SubscriberConfig, TrackerConfig};
pub use lifecycle::Shutdown;
pub use relay::{NotificationRelay, RelayClient, RelayServer};
pub use tracker::{Notification, Tracker};
