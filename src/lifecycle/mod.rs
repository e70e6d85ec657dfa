//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait_for_signal resolves
//!     SIGHUP → ReloadSignal::recv resolves
//!
//! Shutdown (shutdown.rs):
//!     trigger → pollers stop → peer sessions close → server drains → pending
//!     reconstructions aborted
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{wait_for_signal, ReloadSignal};
