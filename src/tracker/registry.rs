//! Wallet registry: per-chain tracked wallets and their cached balances.
//!
//! Chains are sharded in a `DashMap`; each chain owns an ordered wallet list
//! behind its own lock, so pollers of different chains never contend. The
//! cached balance lives in the wallet itself behind a per-wallet mutex, which
//! serializes the detector's read-modify-write without any cross-wallet lock.
//!
//! Addresses are stored in their canonical spelling, so a wallet submitted
//! once checksummed and once lowercase is tracked once.

use alloy::primitives::U256;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::blockchain::{normalize_address, same_address, ChainProvider};
use crate::observability::metrics;
use crate::tracker::error::{TrackerError, TrackerResult};

/// Outcome of recording a freshly observed balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceUpdate {
    /// No balance was cached; the observation became the baseline.
    Baseline,
    /// Same as the cached balance.
    Unchanged,
    /// Balance moved; the cache now holds the new value.
    Changed { previous: U256 },
}

/// A wallet tracked on one chain.
#[derive(Debug)]
pub struct TrackedWallet {
    chain_id: u64,
    address: String,
    balance: Mutex<Option<U256>>,
    /// Earliest block whose reconstruction failed and has not been covered since.
    resume_from: Mutex<Option<u64>>,
}

impl TrackedWallet {
    pub fn new(chain_id: u64, address: impl Into<String>, balance: Option<U256>) -> Self {
        Self {
            chain_id,
            address: address.into(),
            balance: Mutex::new(balance),
            resume_from: Mutex::new(None),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Balance as of the last completed poll, if any.
    pub fn cached_balance(&self) -> Option<U256> {
        *self.balance.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Compare `balance` with the cache and store it.
    ///
    /// The comparison and the write happen under one lock, so a later
    /// observation is always compared against this one.
    pub fn record_balance(&self, balance: U256) -> BalanceUpdate {
        let mut cached = self.balance.lock().unwrap_or_else(|e| e.into_inner());
        match *cached {
            None => {
                *cached = Some(balance);
                BalanceUpdate::Baseline
            }
            Some(previous) if previous == balance => BalanceUpdate::Unchanged,
            Some(previous) => {
                *cached = Some(balance);
                BalanceUpdate::Changed { previous }
            }
        }
    }

    /// First block the next history query must start from, given a task
    /// triggered at `block_number`.
    pub fn query_start(&self, block_number: u64) -> u64 {
        match *self.resume_from.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(missed) => missed.min(block_number),
            None => block_number,
        }
    }

    /// Remember that history from `block_number` onward was never fetched.
    pub fn mark_missed(&self, block_number: u64) {
        let mut resume = self.resume_from.lock().unwrap_or_else(|e| e.into_inner());
        *resume = Some(resume.map_or(block_number, |missed| missed.min(block_number)));
    }

    /// Forget missed ranges now covered by a query starting at `since_block`.
    pub fn mark_covered(&self, since_block: u64) {
        let mut resume = self.resume_from.lock().unwrap_or_else(|e| e.into_inner());
        if resume.is_some_and(|missed| missed >= since_block) {
            *resume = None;
        }
    }

    /// Pending missed block, if a reconstruction failed.
    pub fn missed_block(&self) -> Option<u64> {
        *self.resume_from.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Registry entry for one configured chain.
struct ChainEntry {
    provider: Arc<dyn ChainProvider>,
    wallets: RwLock<Vec<Arc<TrackedWallet>>>,
}

/// Process-wide mapping from chain to tracked wallets.
#[derive(Default)]
pub struct WalletRegistry {
    chains: DashMap<u64, Arc<ChainEntry>>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chain and its provider. Returns false if the chain already exists.
    pub fn register_chain(&self, provider: Arc<dyn ChainProvider>) -> bool {
        let chain_id = provider.chain_id();
        if self.chains.contains_key(&chain_id) {
            return false;
        }
        self.chains.insert(
            chain_id,
            Arc::new(ChainEntry {
                provider,
                wallets: RwLock::new(Vec::new()),
            }),
        );
        true
    }

    fn entry(&self, chain_id: u64) -> TrackerResult<Arc<ChainEntry>> {
        self.chains
            .get(&chain_id)
            .map(|r| r.value().clone())
            .ok_or(TrackerError::UnknownChain(chain_id))
    }

    /// Track `address` on `chain_id` without a known balance.
    ///
    /// Returns whether the wallet was newly added. Malformed addresses are
    /// rejected with `InvalidAddress`.
    pub fn add_wallet(&self, chain_id: u64, address: &str) -> TrackerResult<bool> {
        self.add_wallet_with_balance(chain_id, address, None)
    }

    /// Track `address` with an optional baseline balance.
    ///
    /// An already tracked address keeps its existing cache.
    pub fn add_wallet_with_balance(
        &self,
        chain_id: u64,
        address: &str,
        balance: Option<U256>,
    ) -> TrackerResult<bool> {
        let entry = self.entry(chain_id)?;
        let address = normalize_address(address)?;
        let mut wallets = entry.wallets.write().unwrap_or_else(|e| e.into_inner());
        if wallets.iter().any(|w| w.address == address) {
            return Ok(false);
        }
        wallets.push(Arc::new(TrackedWallet::new(chain_id, address, balance)));
        metrics::record_tracked_wallets(chain_id, wallets.len());
        Ok(true)
    }

    /// Stop tracking `address`. Returns whether it was tracked.
    pub fn remove_wallet(&self, chain_id: u64, address: &str) -> TrackerResult<bool> {
        let entry = self.entry(chain_id)?;
        let mut wallets = entry.wallets.write().unwrap_or_else(|e| e.into_inner());
        let before = wallets.len();
        wallets.retain(|w| !same_address(&w.address, address));
        metrics::record_tracked_wallets(chain_id, wallets.len());
        Ok(wallets.len() != before)
    }

    /// Current wallets of a chain, in insertion order.
    pub fn snapshot(&self, chain_id: u64) -> TrackerResult<Vec<Arc<TrackedWallet>>> {
        let entry = self.entry(chain_id)?;
        let wallets = entry.wallets.read().unwrap_or_else(|e| e.into_inner());
        Ok(wallets.clone())
    }

    /// Whether `address` is currently tracked on `chain_id`.
    pub fn contains(&self, chain_id: u64, address: &str) -> bool {
        match self.entry(chain_id) {
            Ok(entry) => entry
                .wallets
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .any(|w| same_address(&w.address, address)),
            Err(_) => false,
        }
    }

    /// Look up a tracked wallet.
    pub fn wallet(&self, chain_id: u64, address: &str) -> Option<Arc<TrackedWallet>> {
        let entry = self.entry(chain_id).ok()?;
        let wallets = entry.wallets.read().unwrap_or_else(|e| e.into_inner());
        wallets.iter().find(|w| same_address(&w.address, address)).cloned()
    }

    /// Configured chains, ascending.
    pub fn all_chains(&self) -> Vec<u64> {
        let mut chains: Vec<u64> = self.chains.iter().map(|r| *r.key()).collect();
        chains.sort_unstable();
        chains
    }

    /// Provider handle of a chain.
    pub fn provider(&self, chain_id: u64) -> TrackerResult<Arc<dyn ChainProvider>> {
        Ok(self.entry(chain_id)?.provider.clone())
    }

    /// Total number of tracked wallets across chains.
    pub fn wallet_count(&self) -> usize {
        self.chains
            .iter()
            .map(|r| r.value().wallets.read().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{BlockSubscription, BlockchainError, BlockchainResult};
    use async_trait::async_trait;

    const A: &str = "0xaaaa000000000000000000000000000000000001";
    const B: &str = "0xbbbb000000000000000000000000000000000002";

    struct NullProvider(u64);

    #[async_trait]
    impl ChainProvider for NullProvider {
        fn chain_id(&self) -> u64 {
            self.0
        }

        async fn get_balance(&self, _address: &str) -> BlockchainResult<U256> {
            Ok(U256::ZERO)
        }

        async fn subscribe_blocks(&self) -> BlockchainResult<BlockSubscription> {
            Err(BlockchainError::NotAvailable("null provider".into()))
        }
    }

    fn registry() -> WalletRegistry {
        let registry = WalletRegistry::new();
        registry.register_chain(Arc::new(NullProvider(11_155_111)));
        registry
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = registry();
        assert!(registry.add_wallet(11_155_111, A).unwrap());
        assert!(!registry.add_wallet(11_155_111, A).unwrap());
        assert_eq!(registry.snapshot(11_155_111).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_leaves_balance_unset() {
        let registry = registry();
        registry.add_wallet(11_155_111, A).unwrap();
        let wallet = registry.wallet(11_155_111, A).unwrap();
        assert_eq!(wallet.cached_balance(), None);
    }

    #[test]
    fn test_readd_keeps_existing_cache() {
        let registry = registry();
        registry
            .add_wallet_with_balance(11_155_111, A, Some(U256::from(100)))
            .unwrap();
        registry
            .add_wallet_with_balance(11_155_111, A, Some(U256::from(5)))
            .unwrap();
        let wallet = registry.wallet(11_155_111, A).unwrap();
        assert_eq!(wallet.cached_balance(), Some(U256::from(100)));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = registry();
        registry.add_wallet(11_155_111, A).unwrap();
        registry.add_wallet(11_155_111, B).unwrap();
        assert!(registry.remove_wallet(11_155_111, A).unwrap());
        assert!(!registry.remove_wallet(11_155_111, A).unwrap());

        let remaining: Vec<_> = registry
            .snapshot(11_155_111)
            .unwrap()
            .iter()
            .map(|w| w.address().to_string())
            .collect();
        assert_eq!(remaining, vec![B.to_string()]);
        assert!(!registry.contains(11_155_111, A));
    }

    #[test]
    fn test_unknown_chain_is_an_error() {
        let registry = registry();
        assert!(matches!(
            registry.add_wallet(1, A),
            Err(TrackerError::UnknownChain(1))
        ));
        assert!(matches!(registry.remove_wallet(1, A), Err(TrackerError::UnknownChain(1))));
        assert!(registry.snapshot(1).is_err());
        assert!(!registry.contains(1, A));
    }

    #[test]
    fn test_all_chains_sorted() {
        let registry = registry();
        registry.register_chain(Arc::new(NullProvider(1)));
        assert!(!registry.register_chain(Arc::new(NullProvider(1))));
        assert_eq!(registry.all_chains(), vec![1, 11_155_111]);
    }

    #[test]
    fn test_record_balance_transitions() {
        let wallet = TrackedWallet::new(1, A, None);
        assert_eq!(wallet.record_balance(U256::from(100)), BalanceUpdate::Baseline);
        assert_eq!(wallet.record_balance(U256::from(100)), BalanceUpdate::Unchanged);
        assert_eq!(
            wallet.record_balance(U256::from(150)),
            BalanceUpdate::Changed { previous: U256::from(100) }
        );
        assert_eq!(wallet.cached_balance(), Some(U256::from(150)));
    }

    #[test]
    fn test_spellings_of_one_address_dedupe() {
        let registry = registry();
        let checksummed = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
        let lower = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

        assert!(registry.add_wallet(11_155_111, checksummed).unwrap());
        assert!(!registry.add_wallet(11_155_111, lower).unwrap());
        assert_eq!(registry.wallet_count(), 1);
        assert_eq!(registry.snapshot(11_155_111).unwrap()[0].address(), lower);
        assert!(registry.contains(11_155_111, checksummed));

        assert!(registry.remove_wallet(11_155_111, checksummed).unwrap());
        assert!(!registry.contains(11_155_111, lower));
    }

    #[test]
    fn test_malformed_address_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.add_wallet(11_155_111, "0xA"),
            Err(TrackerError::Blockchain(BlockchainError::InvalidAddress(_)))
        ));
        assert_eq!(registry.wallet_count(), 0);
    }

    #[test]
    fn test_missed_block_widens_next_query() {
        let wallet = TrackedWallet::new(1, A, None);
        assert_eq!(wallet.query_start(1005), 1005);

        wallet.mark_missed(1001);
        wallet.mark_missed(1003);
        assert_eq!(wallet.missed_block(), Some(1001));
        assert_eq!(wallet.query_start(1005), 1001);
        assert_eq!(wallet.query_start(990), 990);

        wallet.mark_covered(1001);
        assert_eq!(wallet.missed_block(), None);
        assert_eq!(wallet.query_start(1005), 1005);
    }
}
