//! Shared fakes for integration tests.
#![allow(dead_code)]

use alloy::primitives::U256;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use wallet_tracker::blockchain::{
    BlockExplorer, BlockSubscription, BlockchainError, BlockchainResult, ChainProvider, ExplorerError,
    ExplorerTransaction,
};
use wallet_tracker::config::{PollerConfig, ReconstructionConfig};
use wallet_tracker::peer::{MessageSink, SinkError};
use wallet_tracker::relay::NotificationRelay;
use wallet_tracker::tracker::{Tracker, WalletRegistry};

pub const SEPOLIA: u64 = 11_155_111;

/// Chain provider with settable balances and a manually driven block feed.
pub struct FakeProvider {
    chain_id: u64,
    balances: Mutex<HashMap<String, U256>>,
    failing: Mutex<HashSet<String>>,
    feed: Mutex<Option<mpsc::Sender<u64>>>,
    stalled: AtomicBool,
    pub balance_calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            balances: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            feed: Mutex::new(None),
            stalled: AtomicBool::new(false),
            balance_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_balance(&self, address: &str, balance: u64) {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_ascii_lowercase(), U256::from(balance));
    }

    pub fn fail_for(&self, address: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(address.to_ascii_lowercase());
        } else {
            set.remove(&address.to_ascii_lowercase());
        }
    }

    /// Make every later balance request hang until dropped.
    pub fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Push a new block to the current subscriber. False if none is subscribed.
    pub async fn emit_block(&self, number: u64) -> bool {
        let sender = self.feed.lock().unwrap().clone();
        match sender {
            Some(tx) => tx.send(number).await.is_ok(),
            None => false,
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.feed.lock().unwrap().is_some()
    }
}

#[async_trait]
impl ChainProvider for FakeProvider {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_balance(&self, address: &str) -> BlockchainResult<U256> {
        self.balance_calls.lock().unwrap().push(address.to_string());
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let key = address.to_ascii_lowercase();
        if self.failing.lock().unwrap().contains(&key) {
            return Err(BlockchainError::Timeout(10));
        }
        if !address.starts_with("0x") {
            return Err(BlockchainError::InvalidAddress(address.to_string()));
        }
        Ok(self.balances.lock().unwrap().get(&key).copied().unwrap_or(U256::ZERO))
    }

    async fn subscribe_blocks(&self) -> BlockchainResult<BlockSubscription> {
        let (tx, rx) = mpsc::channel(16);
        *self.feed.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}

/// Explorer returning scripted responses in order, then empty histories.
///
/// Like a real explorer, only transactions at or after the queried block
/// are returned.
#[derive(Default)]
pub struct FakeExplorer {
    responses: Mutex<VecDeque<Result<Vec<ExplorerTransaction>, ExplorerError>>>,
    pub calls: Mutex<Vec<(String, u64, u64)>>,
}

impl FakeExplorer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, transactions: Vec<ExplorerTransaction>) {
        self.responses.lock().unwrap().push_back(Ok(transactions));
    }

    pub fn fail_next(&self) {
        self.responses.lock().unwrap().push_back(Err(ExplorerError::Api {
            message: "NOTOK".to_string(),
            detail: "Max rate limit reached".to_string(),
        }));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BlockExplorer for FakeExplorer {
    async fn list_transactions(
        &self,
        address: &str,
        chain_id: u64,
        since_block: u64,
    ) -> Result<Vec<ExplorerTransaction>, ExplorerError> {
        self.calls
            .lock()
            .unwrap()
            .push((address.to_string(), chain_id, since_block));
        let scripted = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()));
        scripted.map(|txs| {
            txs.into_iter()
                .filter(|tx| tx.block_number >= since_block)
                .collect()
        })
    }
}

pub fn explorer_tx(hash: &str, from: &str, to: &str, value: u64, block: u64) -> ExplorerTransaction {
    ExplorerTransaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        value: value.to_string(),
        method_id: "0x".to_string(),
        function_name: String::new(),
        timestamp: (1_700_000_000 + block).to_string(),
        block_number: block,
    }
}

/// Sink forwarding every delivery to a channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(i64, String)>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(i64, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), SinkError> {
        let _ = self.tx.send((chat_id, text.to_string()));
        Ok(())
    }
}

/// Sink that reports each delivery attempt and then never completes it.
pub struct StallingSink {
    started: mpsc::UnboundedSender<i64>,
}

impl StallingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<i64>) {
        let (started, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { started }), rx)
    }
}

#[async_trait]
impl MessageSink for StallingSink {
    async fn deliver(&self, chat_id: i64, _text: &str) -> Result<(), SinkError> {
        let _ = self.started.send(chat_id);
        std::future::pending().await
    }
}

/// A tracker over one fake chain.
pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub explorer: Arc<FakeExplorer>,
    pub tracker: Arc<Tracker>,
}

pub fn harness(delay_secs: u64) -> Harness {
    let provider = FakeProvider::new(SEPOLIA);
    let explorer = FakeExplorer::new();
    let registry = Arc::new(WalletRegistry::new());
    registry.register_chain(provider.clone());

    let tracker = Arc::new(Tracker::new(
        registry,
        explorer.clone(),
        NotificationRelay::new(64),
        PollerConfig::default(),
        &ReconstructionConfig { delay_secs },
    ));

    Harness {
        provider,
        explorer,
        tracker,
    }
}

/// Poll `check` every 10ms until it holds or `limit` elapses.
pub async fn wait_until<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
