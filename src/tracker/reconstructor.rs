//! Transaction reconstruction: explorer history → ordered notifications.

use std::sync::Arc;

use crate::blockchain::BlockExplorer;
use crate::observability::metrics;
use crate::relay::NotificationRelay;
use crate::tracker::notification::Notification;
use crate::tracker::registry::WalletRegistry;

/// A balance change waiting for the explorer to catch up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingReconstruction {
    pub chain_id: u64,
    pub address: String,
    /// Block at which the balance change was observed.
    pub block_number: u64,
}

pub struct TransactionReconstructor {
    registry: Arc<WalletRegistry>,
    explorer: Arc<dyn BlockExplorer>,
    relay: NotificationRelay,
}

impl TransactionReconstructor {
    pub fn new(
        registry: Arc<WalletRegistry>,
        explorer: Arc<dyn BlockExplorer>,
        relay: NotificationRelay,
    ) -> Self {
        Self {
            registry,
            explorer,
            relay,
        }
    }

    /// Fetch the wallet's transactions since the triggering block and relay
    /// them oldest-first. Returns the notifications that were built.
    ///
    /// A wallet no longer in the registry yields nothing. When the explorer
    /// fails, the block is remembered on the wallet and the next task for it
    /// queries from that block instead of its own.
    pub async fn reconstruct(&self, task: &PendingReconstruction) -> Vec<Notification> {
        let Some(wallet) = self.registry.wallet(task.chain_id, &task.address) else {
            tracing::debug!(
                chain_id = task.chain_id,
                wallet = %task.address,
                "Wallet no longer tracked, skipping reconstruction"
            );
            return Vec::new();
        };

        let since_block = wallet.query_start(task.block_number);
        let mut transactions = match self
            .explorer
            .list_transactions(wallet.address(), task.chain_id, since_block)
            .await
        {
            Ok(txs) => {
                wallet.mark_covered(since_block);
                txs
            }
            Err(e) => {
                wallet.mark_missed(since_block);
                tracing::warn!(
                    chain_id = task.chain_id,
                    wallet = %task.address,
                    block = task.block_number,
                    since_block,
                    error = %e,
                    "Failed to fetch transaction history, will retry on next change"
                );
                metrics::record_explorer_failure(task.chain_id);
                return Vec::new();
            }
        };

        // Explorer order is newest-first.
        transactions.reverse();

        tracing::info!(
            chain_id = task.chain_id,
            wallet = %task.address,
            block = task.block_number,
            since_block,
            count = transactions.len(),
            "Reconstructed transactions"
        );

        let notifications: Vec<Notification> = transactions
            .iter()
            .map(|tx| Notification::from_transaction(wallet.address(), task.chain_id, tx))
            .collect();

        for notification in &notifications {
            metrics::record_notification(task.chain_id, notification.direction);
            self.relay.publish_notification(notification.clone());
        }

        notifications
    }
}
