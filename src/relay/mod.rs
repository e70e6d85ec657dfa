//! Notification Relay Channel.
//!
//! # Data Flow
//! ```text
//! Core process:
//!     reconstructor → hub.rs (broadcast) → server.rs (one task per peer) → WebSocket
//!
//! Peer process:
//!     WebSocket → client.rs → resolver
//!
//! Handshake on every (re)connect (session.rs):
//!     core → REQUEST_WALLETS
//!     peer → WALLETS_TO_TRACK { chainId: [address] }   (additive)
//! ```
//!
//! # Design Decisions
//! - The hub is bounded; publishing never blocks the poll loop
//! - With no peer connected, events are dropped with a warning
//! - A lagging peer loses its oldest events, not the newest

pub mod client;
pub mod hub;
pub mod messages;
pub mod server;
pub mod session;

pub use client::{RelayClient, RelayClientHandle};
pub use hub::{NotificationRelay, RelayEvent};
pub use messages::{RelayMessage, WalletSet, WalletStatus};
pub use server::{AppState, RelayServer, WalletRequest};
pub use session::{SyncSession, SyncState};
