//! Deferred reconstruction tasks keyed by (chain, wallet, block).
//!
//! Each task is a spawned timer, so waiting never occupies a poller. The
//! pending map deduplicates tasks for the same key and keeps abort handles
//! for shutdown. Timers use `tokio::time`, so tests can fast-forward them
//! with a paused clock.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{sleep_until, Instant};

use crate::tracker::reconstructor::{PendingReconstruction, TransactionReconstructor};

pub struct ReconstructionScheduler {
    delay: Duration,
    reconstructor: Arc<TransactionReconstructor>,
    pending: Arc<DashMap<PendingReconstruction, AbortHandle>>,
}

impl ReconstructionScheduler {
    pub fn new(delay: Duration, reconstructor: Arc<TransactionReconstructor>) -> Self {
        Self {
            delay,
            reconstructor,
            pending: Arc::new(DashMap::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `task` to fire after the delay window.
    ///
    /// Returns false if an identical task is already pending.
    pub fn schedule(&self, task: PendingReconstruction) -> bool {
        match self.pending.entry(task.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let fire_at = Instant::now() + self.delay;
                let pending = self.pending.clone();
                let reconstructor = self.reconstructor.clone();

                let handle = tokio::spawn(async move {
                    sleep_until(fire_at).await;
                    pending.remove(&task);
                    reconstructor.reconstruct(&task).await;
                });

                slot.insert(handle.abort_handle());
                true
            }
        }
    }

    /// Whether `task` is waiting to fire.
    pub fn is_pending(&self, task: &PendingReconstruction) -> bool {
        self.pending.contains_key(task)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Abort every pending timer. Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.pending.retain(|_, handle| {
            handle.abort();
            cancelled += 1;
            false
        });
        cancelled
    }
}
