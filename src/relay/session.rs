//! Synchronization state of one relay connection.
//!
//! ```text
//!   Disconnected ──connect──▶ Syncing ──wallet set exchanged──▶ Synced
//!        ▲                       │                                 │
//!        └───────────────────────┴────────── disconnect ───────────┘
//! ```
//!
//! Every (re)connection re-enters at `Syncing`; the handshake is always run
//! from scratch.

use crate::relay::messages::RelayMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Disconnected,
    Syncing,
    Synced,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Disconnected => write!(f, "disconnected"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Synced => write!(f, "synced"),
        }
    }
}

#[derive(Debug, Default)]
pub struct SyncSession {
    state: SyncState,
}

impl SyncSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Connection established. Returns the handshake opener the core sends.
    pub fn connect(&mut self) -> RelayMessage {
        self.state = SyncState::Syncing;
        RelayMessage::RequestWallets
    }

    /// A wallet set was exchanged. Unsolicited updates while already synced
    /// keep the session synced.
    pub fn wallet_set_exchanged(&mut self) -> SyncState {
        let previous = self.state;
        if previous != SyncState::Disconnected {
            self.state = SyncState::Synced;
        }
        previous
    }

    pub fn disconnect(&mut self) {
        self.state = SyncState::Disconnected;
    }
}
