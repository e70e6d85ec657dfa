//! Relay wire messages.
//!
//! Every frame is a JSON text frame of the form
//! `{"event": "<NAME>", "data": <payload>}`; `REQUEST_WALLETS` carries no data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tracker::Notification;

/// Addresses to track, grouped by chain.
pub type WalletSet = BTreeMap<u64, Vec<String>>;

/// Informational status of a tracked wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStatus {
    pub address: String,
    pub chain_id: u64,
    /// Whether the wallet is tracked after the change.
    pub tracked: bool,
    /// Cached balance as a decimal string, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayMessage {
    /// Ask the peer for the full address set to track.
    RequestWallets,
    /// Reply to `RequestWallets`, or an unsolicited update. Additive only.
    WalletsToTrack(WalletSet),
    NewTransaction(Notification),
    WalletStatusUpdate(WalletStatus),
    Error { message: String },
}

impl RelayMessage {
    pub fn encode(&self) -> String {
        // Serializing these types cannot fail: all map keys are integers.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            RelayMessage::RequestWallets => "REQUEST_WALLETS",
            RelayMessage::WalletsToTrack(_) => "WALLETS_TO_TRACK",
            RelayMessage::NewTransaction(_) => "NEW_TRANSACTION",
            RelayMessage::WalletStatusUpdate(_) => "WALLET_STATUS_UPDATE",
            RelayMessage::Error { .. } => "ERROR",
        }
    }
}
