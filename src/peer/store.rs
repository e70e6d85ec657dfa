//! Subscription records held by the subscriber-facing peer.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::blockchain::{normalize_address, same_address};
use crate::relay::WalletSet;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store format error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// An end user who receives notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    /// Destination handed to the message sink.
    pub chat_id: i64,
}

/// A user's named interest in one wallet on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: u64,
    pub user_id: u64,
    pub name: String,
    pub address: String,
    pub chain_id: u64,
}

/// Read contract the resolver and relay client need from the store.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Subscriptions whose address names the same account, in any hex case.
    async fn subscriptions_for(&self, address: &str) -> Result<Vec<Subscription>, StoreError>;

    async fn user(&self, user_id: u64) -> Result<Option<User>, StoreError>;

    /// Distinct subscribed addresses grouped by chain.
    async fn wallets_to_track(&self) -> Result<WalletSet, StoreError>;
}

#[derive(Default, Serialize, Deserialize)]
struct StoreFile {
    users: Vec<User>,
    subscriptions: Vec<Subscription>,
}

/// In-memory store persisted as a single JSON document.
#[derive(Clone, Default)]
pub struct JsonSubscriptionStore {
    users: Arc<DashMap<u64, User>>,
    subscriptions: Arc<DashMap<u64, Subscription>>,
    next_id: Arc<AtomicU64>,
    persistence_path: Option<PathBuf>,
}

impl JsonSubscriptionStore {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            persistence_path,
            ..Default::default()
        }
    }

    /// Load from `path` if it exists, otherwise start empty. Saves go back to `path`.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self::new(Some(path.as_ref().to_path_buf()));
        store.reload()?;
        Ok(store)
    }

    /// Replace the in-memory records with the persisted file's contents.
    ///
    /// A missing file leaves the store untouched. Ids handed out later
    /// continue after the highest known one.
    pub fn reload(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let reader = BufReader::new(File::open(path)?);
        let file: StoreFile = serde_json::from_reader(reader)?;

        self.users.clear();
        self.subscriptions.clear();
        let mut max_id = 0;
        for user in file.users {
            self.users.insert(user.id, user);
        }
        for sub in file.subscriptions {
            max_id = max_id.max(sub.id);
            self.subscriptions.insert(sub.id, sub);
        }
        self.next_id.fetch_max(max_id + 1, Ordering::SeqCst);
        tracing::info!(
            users = self.users.len(),
            subscriptions = self.subscriptions.len(),
            "Loaded subscription store"
        );
        Ok(())
    }

    pub fn save_to_file(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let mut file = StoreFile {
            users: self.users.iter().map(|r| r.value().clone()).collect(),
            subscriptions: self.subscriptions.iter().map(|r| r.value().clone()).collect(),
        };
        file.users.sort_by_key(|u| u.id);
        file.subscriptions.sort_by_key(|s| s.id);

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &file)?;
        tracing::debug!(path = %path.display(), "Saved subscription store");
        Ok(())
    }

    pub fn add_user(&self, id: u64, chat_id: i64) {
        self.users.insert(id, User { id, chat_id });
    }

    /// Record a subscription and return its id.
    pub fn add_subscription(&self, user_id: u64, name: &str, address: &str, chain_id: u64) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.insert(
            id,
            Subscription {
                id,
                user_id,
                name: name.to_string(),
                address: address.to_string(),
                chain_id,
            },
        );
        id
    }

    pub fn remove_subscription(&self, id: u64) -> Option<Subscription> {
        self.subscriptions.remove(&id).map(|(_, sub)| sub)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[async_trait]
impl SubscriptionStore for JsonSubscriptionStore {
    async fn subscriptions_for(&self, address: &str) -> Result<Vec<Subscription>, StoreError> {
        let mut matches: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|r| same_address(&r.value().address, address))
            .map(|r| r.value().clone())
            .collect();
        matches.sort_by_key(|s| s.id);
        Ok(matches)
    }

    async fn user(&self, user_id: u64) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&user_id).map(|r| r.value().clone()))
    }

    async fn wallets_to_track(&self) -> Result<WalletSet, StoreError> {
        let mut grouped: std::collections::BTreeMap<u64, BTreeSet<String>> = Default::default();
        for r in self.subscriptions.iter() {
            let address = &r.value().address;
            grouped
                .entry(r.value().chain_id)
                .or_default()
                .insert(normalize_address(address).unwrap_or_else(|_| address.clone()));
        }
        Ok(grouped
            .into_iter()
            .map(|(chain, addresses)| (chain, addresses.into_iter().collect()))
            .collect())
    }
}
