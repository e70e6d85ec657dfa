//! Subscriber-facing peer.
//!
//! # Data Flow
//! ```text
//! relay client (NEW_TRANSACTION)
//!     → resolver.rs (subscriptions for the wallet address)
//!     → store.rs (owning user)
//!     → sink.rs (formatted message per subscriber)
//! ```
//!
//! The store also answers `REQUEST_WALLETS` with every subscribed address,
//! grouped by chain.

pub mod resolver;
pub mod sink;
pub mod store;
pub mod tracker_api;

pub use resolver::{format_message, DeliveryReport, ResolveError, SubscriberResolver};
pub use sink::{LogSink, MessageSink, SinkError, WebhookSink};
pub use store::{JsonSubscriptionStore, StoreError, Subscription, SubscriptionStore, User};
pub use tracker_api::{TrackerApi, TrackerApiError};
