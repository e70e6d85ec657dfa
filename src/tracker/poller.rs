//! Per-chain poller: new block → balance check of every tracked wallet.

use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

use crate::config::PollerConfig;
use crate::tracker::detector::{BalanceChangeDetector, Observation};
use crate::tracker::registry::WalletRegistry;

/// Counters for one polled block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub wallets: usize,
    pub changed: usize,
    pub failed: usize,
}

pub struct ChainPoller {
    chain_id: u64,
    registry: Arc<WalletRegistry>,
    detector: Arc<BalanceChangeDetector>,
    config: PollerConfig,
}

impl ChainPoller {
    pub fn new(
        chain_id: u64,
        registry: Arc<WalletRegistry>,
        detector: Arc<BalanceChangeDetector>,
        config: PollerConfig,
    ) -> Self {
        Self {
            chain_id,
            registry,
            detector,
            config,
        }
    }

    /// Follow the chain's block subscription until shutdown.
    ///
    /// Reconnection is the provider's job; when its stream ends the poller
    /// simply subscribes again.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let provider = match self.registry.provider(self.chain_id) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(chain_id = self.chain_id, error = %e, "Poller started for unregistered chain");
                return;
            }
        };
        let resubscribe_delay = Duration::from_millis(self.config.resubscribe_delay_ms);

        tracing::info!(chain_id = self.chain_id, "Chain poller starting");

        loop {
            let subscription = tokio::select! {
                result = provider.subscribe_blocks() => result,
                _ = shutdown.recv() => break,
            };

            let mut blocks = match subscription {
                Ok(blocks) => blocks,
                Err(e) => {
                    tracing::warn!(chain_id = self.chain_id, error = %e, "Block subscription failed");
                    tokio::select! {
                        _ = sleep(resubscribe_delay) => continue,
                        _ = shutdown.recv() => break,
                    }
                }
            };

            loop {
                let number = tokio::select! {
                    block = blocks.recv() => match block {
                        Some(number) => number,
                        None => {
                            tracing::warn!(chain_id = self.chain_id, "Block subscription closed, re-subscribing");
                            break;
                        }
                    },
                    _ = shutdown.recv() => {
                        tracing::info!(chain_id = self.chain_id, "Chain poller received shutdown signal");
                        return;
                    }
                };

                // Wallets already observed keep their update; the rest are
                // simply not polled for this block.
                tokio::select! {
                    _ = self.poll_block(number) => {}
                    _ = shutdown.recv() => {
                        tracing::info!(chain_id = self.chain_id, block = number, "Shutdown during block poll");
                        return;
                    }
                }
            }
        }

        tracing::info!(chain_id = self.chain_id, "Chain poller stopped");
    }

    /// Fetch balances of every tracked wallet and feed them to the detector.
    ///
    /// Fetches run concurrently up to `balance_concurrency`; a failed fetch
    /// only affects its own wallet.
    pub async fn poll_block(&self, block_number: u64) -> PollSummary {
        let provider = match self.registry.provider(self.chain_id) {
            Ok(p) => p,
            Err(_) => return PollSummary::default(),
        };
        let wallets = match self.registry.snapshot(self.chain_id) {
            Ok(w) => w,
            Err(_) => return PollSummary::default(),
        };

        let mut summary = PollSummary {
            wallets: wallets.len(),
            ..Default::default()
        };

        let mut results = stream::iter(wallets)
            .map(|wallet| {
                let provider = provider.clone();
                async move {
                    let balance = provider.get_balance(wallet.address()).await;
                    (wallet, balance)
                }
            })
            .buffer_unordered(self.config.balance_concurrency.max(1));

        while let Some((wallet, balance)) = results.next().await {
            match balance {
                Ok(balance) => {
                    if let Observation::Changed { .. } | Observation::AlreadyScheduled =
                        self.detector.on_balance_observed(&wallet, balance, block_number)
                    {
                        summary.changed += 1;
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        chain_id = self.chain_id,
                        wallet = %wallet.address(),
                        block = block_number,
                        error = %e,
                        "Balance fetch failed"
                    );
                }
            }
        }

        tracing::debug!(
            chain_id = self.chain_id,
            block = block_number,
            wallets = summary.wallets,
            changed = summary.changed,
            failed = summary.failed,
            "Block polled"
        );
        summary
    }
}
