//! Balance-change detection.

use alloy::primitives::U256;
use std::sync::Arc;

use crate::observability::metrics;
use crate::tracker::reconstructor::PendingReconstruction;
use crate::tracker::registry::{BalanceUpdate, TrackedWallet, WalletRegistry};
use crate::tracker::scheduler::ReconstructionScheduler;

/// What the detector did with one balance observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First balance seen for the wallet.
    Baseline,
    Unchanged,
    /// Balance moved and a reconstruction was scheduled.
    Changed { previous: U256, current: U256 },
    /// Balance moved but a task for this block was already pending.
    AlreadyScheduled,
    /// The wallet left the registry while its balance was being fetched.
    Untracked,
}

pub struct BalanceChangeDetector {
    registry: Arc<WalletRegistry>,
    scheduler: Arc<ReconstructionScheduler>,
}

impl BalanceChangeDetector {
    pub fn new(registry: Arc<WalletRegistry>, scheduler: Arc<ReconstructionScheduler>) -> Self {
        Self { registry, scheduler }
    }

    /// Record `balance` for `wallet` as of `block_number`.
    ///
    /// The cache is updated before the reconstruction is scheduled, so a
    /// second change arriving inside the delay window is diffed against the
    /// new value.
    pub fn on_balance_observed(&self, wallet: &TrackedWallet, balance: U256, block_number: u64) -> Observation {
        if !self.registry.contains(wallet.chain_id(), wallet.address()) {
            return Observation::Untracked;
        }

        match wallet.record_balance(balance) {
            BalanceUpdate::Baseline => {
                tracing::debug!(
                    chain_id = wallet.chain_id(),
                    wallet = %wallet.address(),
                    balance = %balance,
                    "Balance baseline established"
                );
                Observation::Baseline
            }
            BalanceUpdate::Unchanged => Observation::Unchanged,
            BalanceUpdate::Changed { previous } => {
                tracing::info!(
                    chain_id = wallet.chain_id(),
                    wallet = %wallet.address(),
                    block = block_number,
                    previous = %previous,
                    current = %balance,
                    delay_secs = self.scheduler.delay().as_secs(),
                    "Balance changed, scheduling reconstruction"
                );
                metrics::record_balance_change(wallet.chain_id());

                let scheduled = self.scheduler.schedule(PendingReconstruction {
                    chain_id: wallet.chain_id(),
                    address: wallet.address().to_string(),
                    block_number,
                });
                if scheduled {
                    Observation::Changed {
                        previous,
                        current: balance,
                    }
                } else {
                    Observation::AlreadyScheduled
                }
            }
        }
    }
}
