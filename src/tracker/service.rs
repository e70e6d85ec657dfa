//! Tracker facade: wires registry, detector, scheduler and pollers together
//! and exposes the wallet mutation operations used by the relay server.

use alloy::primitives::U256;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::blockchain::{normalize_address, BlockExplorer, BlockchainError};
use crate::config::{PollerConfig, ReconstructionConfig};
use crate::lifecycle::Shutdown;
use crate::relay::{NotificationRelay, WalletSet, WalletStatus};
use crate::tracker::detector::BalanceChangeDetector;
use crate::tracker::error::{TrackerError, TrackerResult};
use crate::tracker::poller::ChainPoller;
use crate::tracker::reconstructor::TransactionReconstructor;
use crate::tracker::registry::WalletRegistry;
use crate::tracker::scheduler::ReconstructionScheduler;

/// Result of registering a wallet through the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedWallet {
    /// False when the address was already tracked on that chain.
    pub newly_added: bool,
    /// Baseline balance as a decimal string, when it could be fetched.
    pub balance: Option<String>,
    /// Timestamp of the newest known transaction, `"0"` if none.
    pub latest_timestamp: String,
}

pub struct Tracker {
    registry: Arc<WalletRegistry>,
    explorer: Arc<dyn BlockExplorer>,
    relay: NotificationRelay,
    scheduler: Arc<ReconstructionScheduler>,
    detector: Arc<BalanceChangeDetector>,
    poller_config: PollerConfig,
}

impl Tracker {
    pub fn new(
        registry: Arc<WalletRegistry>,
        explorer: Arc<dyn BlockExplorer>,
        relay: NotificationRelay,
        poller_config: PollerConfig,
        reconstruction: &ReconstructionConfig,
    ) -> Self {
        let reconstructor = Arc::new(TransactionReconstructor::new(
            registry.clone(),
            explorer.clone(),
            relay.clone(),
        ));
        let scheduler = Arc::new(ReconstructionScheduler::new(
            Duration::from_secs(reconstruction.delay_secs),
            reconstructor,
        ));
        let detector = Arc::new(BalanceChangeDetector::new(registry.clone(), scheduler.clone()));

        Self {
            registry,
            explorer,
            relay,
            scheduler,
            detector,
            poller_config,
        }
    }

    pub fn registry(&self) -> &Arc<WalletRegistry> {
        &self.registry
    }

    pub fn relay(&self) -> &NotificationRelay {
        &self.relay
    }

    pub fn scheduler(&self) -> &Arc<ReconstructionScheduler> {
        &self.scheduler
    }

    pub fn detector(&self) -> &Arc<BalanceChangeDetector> {
        &self.detector
    }

    /// Build the poller for one chain.
    pub fn poller(&self, chain_id: u64) -> ChainPoller {
        ChainPoller::new(
            chain_id,
            self.registry.clone(),
            self.detector.clone(),
            self.poller_config.clone(),
        )
    }

    /// Spawn one poller per registered chain.
    pub fn spawn_pollers(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        self.registry
            .all_chains()
            .into_iter()
            .map(|chain_id| tokio::spawn(self.poller(chain_id).run(shutdown.subscribe())))
            .collect()
    }

    /// Register a wallet, using its current balance as the baseline.
    ///
    /// Invalid addresses are rejected. A transient RPC failure still registers
    /// the wallet; its baseline is then set by the next poll.
    pub async fn add_wallet(&self, chain_id: u64, address: &str) -> TrackerResult<AddedWallet> {
        let provider = self.registry.provider(chain_id)?;
        let address = normalize_address(address)?;
        let address = address.as_str();

        let balance = match provider.get_balance(address).await {
            Ok(balance) => Some(balance),
            Err(e @ BlockchainError::InvalidAddress(_)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(chain_id, wallet = %address, error = %e, "Could not fetch baseline balance");
                None
            }
        };

        let newly_added = self
            .registry
            .add_wallet_with_balance(chain_id, address, balance)?;

        let latest_timestamp = match self.explorer.latest_timestamp(address, chain_id).await {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!(chain_id, wallet = %address, error = %e, "Could not fetch latest timestamp");
                "0".to_string()
            }
        };

        tracing::info!(chain_id, wallet = %address, newly_added, "Wallet added");
        let balance = self
            .registry
            .wallet(chain_id, address)
            .and_then(|w| w.cached_balance())
            .map(|b: U256| b.to_string());

        self.relay.publish_status(WalletStatus {
            address: address.to_string(),
            chain_id,
            tracked: true,
            balance: balance.clone(),
        });

        Ok(AddedWallet {
            newly_added,
            balance,
            latest_timestamp,
        })
    }

    /// Stop tracking a wallet. Pending reconstructions become no-ops when they fire.
    pub fn remove_wallet(&self, chain_id: u64, address: &str) -> TrackerResult<bool> {
        let removed = self.registry.remove_wallet(chain_id, address)?;
        let address = normalize_address(address).unwrap_or_else(|_| address.to_string());
        if removed {
            tracing::info!(chain_id, wallet = %address, "Wallet removed");
            self.relay.publish_status(WalletStatus {
                address: address.to_string(),
                chain_id,
                tracked: false,
                balance: None,
            });
        }
        Ok(removed)
    }

    /// Merge a synchronization payload into the registry.
    ///
    /// Additive only: addresses absent from `wallets` are kept. Chains that
    /// are not configured here are skipped. Returns the number of new wallets.
    pub fn apply_wallet_set(&self, wallets: &WalletSet) -> usize {
        let mut added = 0;
        for (chain_id, addresses) in wallets {
            for address in addresses {
                match self.registry.add_wallet(*chain_id, address) {
                    Ok(true) => added += 1,
                    Ok(false) => {}
                    Err(TrackerError::UnknownChain(_)) => {
                        tracing::warn!(chain_id, "Sync payload references an unconfigured chain, skipping");
                        break;
                    }
                    Err(e) => tracing::warn!(chain_id, wallet = %address, error = %e, "Failed to add synced wallet"),
                }
            }
        }
        tracing::info!(added, total = self.registry.wallet_count(), "Applied wallet set");
        added
    }

    /// Abort pending reconstructions.
    pub fn shutdown(&self) {
        let cancelled = self.scheduler.cancel_all();
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled pending reconstructions");
        }
    }
}
