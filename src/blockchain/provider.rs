//! Chain provider adapter: balances and new-block events over JSON-RPC.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoints (primary + failovers)
//! - Query balances with per-call timeouts
//! - Turn `eth_blockNumber` polling into a stream of new block numbers
//! - Own the reconnection policy: the stream survives RPC outages and resumes
//!   with exponential backoff

use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};

use crate::blockchain::types::{BlockchainError, BlockchainResult, ChainId};
use crate::config::ChainConfig;
use crate::resilience::backoff::calculate_backoff;

/// Stream of new block numbers, in ascending order.
///
/// The stream ends only when the adapter gives up on the subscription;
/// consumers re-subscribe in that case.
pub type BlockSubscription = mpsc::Receiver<u64>;

/// Read-only view of a single chain.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Chain this provider is connected to.
    fn chain_id(&self) -> u64;

    /// Current balance of `address` in the chain's smallest unit.
    async fn get_balance(&self, address: &str) -> BlockchainResult<U256>;

    /// Subscribe to new-block events.
    async fn subscribe_blocks(&self) -> BlockchainResult<BlockSubscription>;
}

/// JSON-RPC provider backed by alloy, with failover support.
#[derive(Clone)]
pub struct AlloyChainProvider {
    /// List of providers (primary + failovers).
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    /// Configuration.
    config: ChainConfig,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl AlloyChainProvider {
    /// Create a new provider for one configured chain.
    ///
    /// Chain-ID verification failures are logged, not fatal: the endpoint may
    /// simply be down at startup.
    pub async fn connect(config: ChainConfig) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as Arc<dyn Provider + Send + Sync>);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as Arc<dyn Provider + Send + Sync>);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let provider = Self {
            providers,
            config,
            timeout_duration,
        };

        match provider.verify_chain_id().await {
            Ok(()) => tracing::info!(
                chain = %provider.config.name,
                chain_id = provider.config.chain_id,
                "Chain provider initialized"
            ),
            Err(e) => tracing::warn!(
                chain = %provider.config.name,
                error = %e,
                "Chain provider initialized but chain verification failed"
            ),
        }

        Ok(provider)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> BlockchainResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    /// Get the chain ID from the RPC.
    pub async fn get_chain_id(&self) -> BlockchainResult<ChainId> {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.get_chain_id()).await {
                Ok(Ok(result)) => return Ok(ChainId(result)),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, "RPC timeout, trying next provider");
                }
            }
        }
        Err(BlockchainError::Rpc("All RPC providers failed".to_string()))
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> BlockchainResult<u64> {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.get_block_number()).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(BlockchainError::Rpc("All providers failed to get block number".to_string()))
    }

    /// Poll the head and forward every new block number until the receiver is dropped.
    async fn watch_blocks(self, mut last: u64, tx: mpsc::Sender<u64>) {
        let mut ticker = interval(Duration::from_millis(self.config.block_poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        let mut failures: u32 = 0;
        loop {
            if tx.is_closed() {
                break;
            }

            if failures > 0 {
                sleep(calculate_backoff(
                    failures,
                    self.config.reconnect_base_delay_ms,
                    self.config.reconnect_max_delay_ms,
                ))
                .await;
            } else {
                ticker.tick().await;
            }

            let current = match self.get_block_number().await {
                Ok(n) => n,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(chain_id = self.config.chain_id, attempt = failures, error = %e, "Block polling failed");
                    continue;
                }
            };

            if failures > 0 {
                tracing::info!(chain_id = self.config.chain_id, after_attempts = failures, "Block polling reconnected");
                failures = 0;
            }

            if current <= last {
                continue;
            }

            let from = catchup_start(last, current, self.config.max_block_catchup);
            if from > last + 1 {
                tracing::warn!(
                    chain_id = self.config.chain_id,
                    skipped = from - last - 1,
                    "Block gap exceeds catch-up window"
                );
            }

            for block in from..=current {
                if tx.send(block).await.is_err() {
                    return;
                }
            }
            last = current;
        }

        tracing::debug!(chain_id = self.config.chain_id, "Block watcher stopped");
    }

    /// Get the configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

/// First block to replay after observing `current` when `last` was the previous head.
fn catchup_start(last: u64, current: u64, max_catchup: u64) -> u64 {
    let window = max_catchup.max(1);
    (last + 1).max(current.saturating_sub(window - 1))
}

#[async_trait]
impl ChainProvider for AlloyChainProvider {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn get_balance(&self, address: &str) -> BlockchainResult<U256> {
        let address: Address = address
            .parse()
            .map_err(|_| BlockchainError::InvalidAddress(address.to_string()))?;

        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.get_balance(address)).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, "RPC timeout"),
            }
        }
        Err(BlockchainError::Rpc("All providers failed to get balance".to_string()))
    }

    async fn subscribe_blocks(&self) -> BlockchainResult<BlockSubscription> {
        let head = self.get_block_number().await?;
        let (tx, rx) = mpsc::channel(64);

        // The current head is delivered first so baselines are set immediately.
        tx.send(head)
            .await
            .map_err(|_| BlockchainError::NotAvailable("block subscriber dropped".to_string()))?;

        tokio::spawn(self.clone().watch_blocks(head, tx));

        tracing::info!(chain_id = self.config.chain_id, head, "Subscribed to new blocks");
        Ok(rx)
    }
}

impl std::fmt::Debug for AlloyChainProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyChainProvider")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}
