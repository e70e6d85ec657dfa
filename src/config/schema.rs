//! Configuration schema definitions.
//!
//! This module defines the configuration structure for both processes: the
//! tracking core (`TrackerConfig`) and the subscriber-facing peer
//! (`SubscriberConfig`). All types derive Serde traits for deserialization
//! from TOML files.

use serde::{Deserialize, Serialize};

/// Root configuration for the tracking core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TrackerConfig {
    /// Relay server settings (WebSocket + wallet HTTP API).
    pub relay: RelayConfig,

    /// Chain poller settings.
    pub poller: PollerConfig,

    /// Delayed transaction reconstruction settings.
    pub reconstruction: ReconstructionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// One entry per tracked chain.
    pub chains: Vec<ChainConfig>,
}

impl TrackerConfig {
    /// Fill empty explorer API keys from `TRACKER_EXPLORER_API_KEY`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(EXPLORER_API_KEY_ENV_VAR) {
            for chain in self.chains.iter_mut().filter(|c| c.explorer_api_key.is_empty()) {
                chain.explorer_api_key = key.clone();
            }
        }
    }
}

/// Environment variable consulted for the block explorer API key.
pub const EXPLORER_API_KEY_ENV_VAR: &str = "TRACKER_EXPLORER_API_KEY";

/// Relay server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bind address (e.g., "0.0.0.0:3001").
    pub bind_address: String,

    /// Outbound broadcast buffer per subscriber. Slow peers lose the oldest events.
    pub channel_capacity: usize,

    /// Timeout for wallet HTTP API requests in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            channel_capacity: 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Chain poller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Maximum in-flight balance requests per chain per block.
    pub balance_concurrency: usize,

    /// Pause before re-subscribing after a block subscription could not be opened.
    pub resubscribe_delay_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            balance_concurrency: 16,
            resubscribe_delay_ms: 1000,
        }
    }
}

/// Transaction reconstruction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Wait between a detected balance change and the explorer query.
    /// Gives the explorer index time to catch up with the chain.
    pub delay_secs: u64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self { delay_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Per-chain configuration: RPC endpoint, explorer endpoint and seed wallets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain ID (e.g., 11155111 for Sepolia).
    pub chain_id: u64,

    /// Human-readable name used in logs.
    pub name: String,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// How often the provider asks for the latest block number.
    pub block_poll_interval_ms: u64,

    /// Maximum number of intermediate blocks replayed after a gap.
    pub max_block_catchup: u64,

    /// Base delay of the provider's reconnection backoff.
    pub reconnect_base_delay_ms: u64,

    /// Cap of the provider's reconnection backoff.
    pub reconnect_max_delay_ms: u64,

    /// Etherscan-compatible API endpoint (e.g., "https://api-sepolia.etherscan.io/api").
    pub explorer_url: String,

    /// Explorer API key. Falls back to `TRACKER_EXPLORER_API_KEY` when empty.
    pub explorer_api_key: String,

    /// Addresses tracked from startup.
    pub wallets: Vec<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 11_155_111,
            name: "sepolia".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            rpc_timeout_secs: 10,
            block_poll_interval_ms: 4000,
            max_block_catchup: 32,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            explorer_url: "https://api-sepolia.etherscan.io/api".to_string(),
            explorer_api_key: String::new(),
            wallets: Vec::new(),
        }
    }
}

/// Root configuration for the subscriber-facing peer process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Relay WebSocket endpoint of the tracking core.
    pub tracker_ws_url: String,

    /// Path of the JSON subscription store.
    pub store_path: String,

    /// Optional webhook receiving formatted messages. Messages are only logged when unset.
    pub webhook_url: Option<String>,

    /// Relay reconnection policy.
    pub reconnect: ReconnectConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            tracker_ws_url: "ws://127.0.0.1:3001/ws".to_string(),
            store_path: "subscriptions.json".to_string(),
            webhook_url: None,
            reconnect: ReconnectConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Exponential backoff settings for relay reconnection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            max_delay_ms: 15_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_tracker_config() {
        let config: TrackerConfig = toml::from_str(
            r#"
            [[chains]]
            chain_id = 11155111
            rpc_url = "https://rpc.sepolia.org"
            wallets = ["0xabc"]
            "#,
        )
        .unwrap();

        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains[0].wallets, vec!["0xabc".to_string()]);
        assert_eq!(config.chains[0].max_block_catchup, 32);
        assert_eq!(config.reconstruction.delay_secs, 30);
        assert_eq!(config.relay.channel_capacity, 1024);
    }

    #[test]
    fn test_subscriber_defaults() {
        let config: SubscriberConfig = toml::from_str("store_path = \"subs.json\"").unwrap();
        assert_eq!(config.store_path, "subs.json");
        assert!(config.webhook_url.is_none());
        assert_eq!(config.tracker_ws_url, "ws://127.0.0.1:3001/ws");
    }
}
