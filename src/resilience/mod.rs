//! Resilience helpers.
//!
//! Used by the chain provider's block watcher and by the relay client when
//! reconnecting.

pub mod backoff;
