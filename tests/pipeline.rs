//! Block → balance change → delayed reconstruction → relay, with a paused clock.

use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::{sleep, timeout};

use wallet_tracker::relay::{RelayEvent, WalletSet};
use wallet_tracker::tracker::{Direction, Notification, PollSummary};

mod common;
use common::{explorer_tx, harness, SEPOLIA};

const A: &str = "0xaaaa000000000000000000000000000000000001";
const B: &str = "0xbbbb000000000000000000000000000000000002";
const C: &str = "0xcccc000000000000000000000000000000000003";
const OTHER: &str = "0x9999000000000000000000000000000000000009";

async fn next_notification(rx: &mut tokio::sync::broadcast::Receiver<RelayEvent>) -> Notification {
    loop {
        match timeout(Duration::from_secs(120), rx.recv()).await {
            Ok(Ok(RelayEvent::Transaction(n))) => return n,
            Ok(Ok(RelayEvent::WalletStatus(_))) => continue,
            other => panic!("expected notification, got {:?}", other),
        }
    }
}

fn drain_transactions(rx: &mut tokio::sync::broadcast::Receiver<RelayEvent>) -> Vec<Notification> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(RelayEvent::Transaction(n)) => out.push(n),
            Ok(_) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
            Err(TryRecvError::Lagged(_)) => {}
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_observation_is_baseline_only() {
    let h = harness(30);
    let mut rx = h.tracker.relay().subscribe();
    h.tracker.registry().add_wallet(SEPOLIA, A).unwrap();
    h.provider.set_balance(A, 100);

    let summary = h.tracker.poller(SEPOLIA).poll_block(999).await;
    assert_eq!(summary, PollSummary { wallets: 1, changed: 0, failed: 0 });

    sleep(Duration::from_secs(60)).await;
    assert!(drain_transactions(&mut rx).is_empty());
    assert_eq!(h.explorer.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_balance_schedules_nothing() {
    let h = harness(30);
    h.tracker.registry().add_wallet(SEPOLIA, A).unwrap();
    h.provider.set_balance(A, 100);

    let poller = h.tracker.poller(SEPOLIA);
    poller.poll_block(1).await;
    for block in 2..6 {
        let summary = poller.poll_block(block).await;
        assert_eq!(summary.changed, 0);
    }
    assert_eq!(h.tracker.scheduler().pending_count(), 0);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.explorer.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_incoming_transfer_scenario() {
    let h = harness(30);
    let mut rx = h.tracker.relay().subscribe();
    let poller = h.tracker.poller(SEPOLIA);

    h.tracker.registry().add_wallet(SEPOLIA, A).unwrap();
    h.provider.set_balance(A, 100);
    poller.poll_block(999).await;

    h.provider.set_balance(A, 150);
    h.explorer.respond(vec![explorer_tx("h1", OTHER, A, 50, 1000)]);
    let summary = poller.poll_block(1000).await;
    assert_eq!(summary.changed, 1);

    // Cache moves before the task fires.
    let wallet = h.tracker.registry().wallet(SEPOLIA, A).unwrap();
    assert_eq!(wallet.cached_balance(), Some(alloy::primitives::U256::from(150u64)));
    assert_eq!(h.tracker.scheduler().pending_count(), 1);

    let notification = next_notification(&mut rx).await;
    assert_eq!(notification.direction, Direction::In);
    assert_eq!(notification.value, "50");
    assert_eq!(notification.hash, "h1");
    assert_eq!(notification.method, "Transfer");
    assert_eq!(notification.wallet_address, A);

    assert_eq!(h.explorer.calls.lock().unwrap()[0], (A.to_string(), SEPOLIA, 1000));
    assert_eq!(h.tracker.scheduler().pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconstruction_waits_for_delay_window() {
    let h = harness(30);
    let poller = h.tracker.poller(SEPOLIA);
    h.tracker.registry().add_wallet(SEPOLIA, A).unwrap();
    h.provider.set_balance(A, 100);
    poller.poll_block(1).await;
    h.provider.set_balance(A, 90);
    poller.poll_block(2).await;

    sleep(Duration::from_secs(29)).await;
    assert_eq!(h.explorer.call_count(), 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.explorer.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_notifications_are_chronological() {
    let h = harness(30);
    let mut rx = h.tracker.relay().subscribe();
    let poller = h.tracker.poller(SEPOLIA);

    h.tracker.registry().add_wallet(SEPOLIA, A).unwrap();
    h.provider.set_balance(A, 100);
    poller.poll_block(10).await;

    // Explorer answers newest-first.
    h.explorer.respond(vec![
        explorer_tx("h3", A, OTHER, 5, 12),
        explorer_tx("h2", OTHER, A, 20, 11),
        explorer_tx("h1", OTHER, A, 10, 11),
    ]);
    h.provider.set_balance(A, 125);
    poller.poll_block(11).await;

    let hashes: Vec<String> = vec![
        next_notification(&mut rx).await,
        next_notification(&mut rx).await,
        next_notification(&mut rx).await,
    ]
    .into_iter()
    .map(|n| n.hash)
    .collect();
    assert_eq!(hashes, vec!["h1", "h2", "h3"]);
}

#[tokio::test(start_paused = true)]
async fn test_outgoing_transfer_direction() {
    let h = harness(30);
    let mut rx = h.tracker.relay().subscribe();
    let poller = h.tracker.poller(SEPOLIA);

    h.tracker.registry().add_wallet(SEPOLIA, A).unwrap();
    h.provider.set_balance(A, 100);
    poller.poll_block(1).await;

    let mut tx = explorer_tx("h-out", A, OTHER, 40, 2);
    tx.method_id = "0x38ed1739".to_string();
    tx.function_name = "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)".to_string();
    h.explorer.respond(vec![tx]);
    h.provider.set_balance(A, 60);
    poller.poll_block(2).await;

    let notification = next_notification(&mut rx).await;
    assert_eq!(notification.direction, Direction::Out);
    assert_eq!(notification.method, "Swap Exact Tokens For Tokens");
}

#[tokio::test(start_paused = true)]
async fn test_removed_wallet_yields_nothing_when_task_fires() {
    let h = harness(30);
    let mut rx = h.tracker.relay().subscribe();
    let poller = h.tracker.poller(SEPOLIA);

    h.tracker.registry().add_wallet(SEPOLIA, B).unwrap();
    h.provider.set_balance(B, 100);
    poller.poll_block(1).await;
    h.provider.set_balance(B, 0);
    h.explorer.respond(vec![explorer_tx("hb", B, OTHER, 100, 2)]);
    poller.poll_block(2).await;
    assert_eq!(h.tracker.scheduler().pending_count(), 1);

    assert!(h.tracker.remove_wallet(SEPOLIA, B).unwrap());
    // Removal does not cancel the timer.
    assert_eq!(h.tracker.scheduler().pending_count(), 1);

    sleep(Duration::from_secs(31)).await;
    assert_eq!(h.tracker.scheduler().pending_count(), 0);
    assert_eq!(h.explorer.call_count(), 0);
    assert!(drain_transactions(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_explorer_failure_recovers_on_next_change() {
    let h = harness(30);
    let mut rx = h.tracker.relay().subscribe();
    let poller = h.tracker.poller(SEPOLIA);

    h.tracker.registry().add_wallet(SEPOLIA, C).unwrap();
    h.provider.set_balance(C, 100);
    poller.poll_block(1000).await;

    h.explorer.fail_next();
    h.provider.set_balance(C, 110);
    poller.poll_block(1001).await;

    sleep(Duration::from_secs(31)).await;
    assert_eq!(h.explorer.call_count(), 1);
    assert!(drain_transactions(&mut rx).is_empty());
    let wallet = h.tracker.registry().wallet(SEPOLIA, C).unwrap();
    assert_eq!(wallet.missed_block(), Some(1001));

    // The explorer only returns history from the queried block onward, so h1
    // is recovered only if the next query starts at the missed block.
    h.explorer.respond(vec![
        explorer_tx("h2", OTHER, C, 5, 1005),
        explorer_tx("h1", OTHER, C, 10, 1001),
    ]);
    h.provider.set_balance(C, 115);
    poller.poll_block(1005).await;

    let first = next_notification(&mut rx).await;
    let second = next_notification(&mut rx).await;
    assert_eq!((first.hash.as_str(), second.hash.as_str()), ("h1", "h2"));

    let calls = h.explorer.calls.lock().unwrap().clone();
    let since: Vec<u64> = calls.iter().map(|c| c.2).collect();
    assert_eq!(since, vec![1001, 1001]);
    assert_eq!(wallet.missed_block(), None);

    // Once covered, later tasks query from their own block again.
    h.explorer.respond(vec![explorer_tx("h3", C, OTHER, 15, 1010)]);
    h.provider.set_balance(C, 100);
    poller.poll_block(1010).await;
    assert_eq!(next_notification(&mut rx).await.hash, "h3");
    assert_eq!(h.explorer.calls.lock().unwrap()[2].2, 1010);
}

#[tokio::test(start_paused = true)]
async fn test_checksummed_wallet_is_tracked_once_and_sees_incoming() {
    let h = harness(30);
    let mut rx = h.tracker.relay().subscribe();
    let poller = h.tracker.poller(SEPOLIA);
    let checksummed = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    let lower = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    h.provider.set_balance(lower, 100);
    assert!(h.tracker.add_wallet(SEPOLIA, checksummed).await.unwrap().newly_added);
    assert!(!h.tracker.add_wallet(SEPOLIA, lower).await.unwrap().newly_added);

    let mut set = WalletSet::new();
    set.insert(SEPOLIA, vec![checksummed.to_uppercase().replacen("0X", "0x", 1)]);
    assert_eq!(h.tracker.apply_wallet_set(&set), 0);
    assert_eq!(h.tracker.registry().wallet_count(), 1);

    h.provider.set_balance(lower, 150);
    h.explorer.respond(vec![explorer_tx("in", OTHER, lower, 50, 7)]);
    let summary = poller.poll_block(7).await;
    assert_eq!(summary, PollSummary { wallets: 1, changed: 1, failed: 0 });

    let notification = next_notification(&mut rx).await;
    assert_eq!(notification.direction, Direction::In);
    assert_eq!(notification.wallet_address, lower);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_is_isolated_per_wallet() {
    let h = harness(30);
    let poller = h.tracker.poller(SEPOLIA);
    for w in [A, B, C] {
        h.tracker.registry().add_wallet(SEPOLIA, w).unwrap();
        h.provider.set_balance(w, 100);
    }
    poller.poll_block(1).await;

    h.provider.fail_for(B, true);
    h.provider.set_balance(A, 1);
    h.provider.set_balance(B, 2);
    h.provider.set_balance(C, 3);

    let summary = poller.poll_block(2).await;
    assert_eq!(summary, PollSummary { wallets: 3, changed: 2, failed: 1 });

    // B keeps its old cache and is picked up once the RPC recovers.
    let b = h.tracker.registry().wallet(SEPOLIA, B).unwrap();
    assert_eq!(b.cached_balance(), Some(alloy::primitives::U256::from(100u64)));

    h.provider.fail_for(B, false);
    let summary = poller.poll_block(3).await;
    assert_eq!(summary.changed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_change_in_same_block_is_deduplicated() {
    let h = harness(30);
    let wallet = {
        h.tracker.registry().add_wallet(SEPOLIA, A).unwrap();
        h.tracker.registry().wallet(SEPOLIA, A).unwrap()
    };
    let detector = h.tracker.detector();

    detector.on_balance_observed(&wallet, alloy::primitives::U256::from(1u64), 7);
    detector.on_balance_observed(&wallet, alloy::primitives::U256::from(2u64), 8);
    detector.on_balance_observed(&wallet, alloy::primitives::U256::from(3u64), 8);
    assert_eq!(h.tracker.scheduler().pending_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wallet_sync_is_additive_and_idempotent() {
    let h = harness(30);
    let mut full = WalletSet::new();
    full.insert(SEPOLIA, vec![A.to_string(), B.to_string(), C.to_string()]);
    assert_eq!(h.tracker.apply_wallet_set(&full), 3);

    let mut subset = WalletSet::new();
    subset.insert(SEPOLIA, vec![A.to_string()]);
    subset.insert(1, vec![A.to_string()]);
    assert_eq!(h.tracker.apply_wallet_set(&subset), 0);

    let snapshot = h.tracker.registry().snapshot(SEPOLIA).unwrap();
    let addresses: Vec<&str> = snapshot.iter().map(|w| w.address()).collect();
    assert_eq!(addresses, vec![A, B, C]);
    assert!(!h.tracker.registry().all_chains().contains(&1));
}

#[tokio::test(start_paused = true)]
async fn test_poller_follows_block_feed_until_shutdown() {
    let h = harness(30);
    let mut rx = h.tracker.relay().subscribe();
    h.tracker.registry().add_wallet(SEPOLIA, A).unwrap();
    h.provider.set_balance(A, 100);

    let shutdown = wallet_tracker::Shutdown::new();
    let handles = h.tracker.spawn_pollers(&shutdown);
    assert!(common::wait_until(Duration::from_secs(1), || h.provider.has_subscriber()).await);

    assert!(h.provider.emit_block(50).await);
    let wallet = h.tracker.registry().wallet(SEPOLIA, A).unwrap();
    assert!(common::wait_until(Duration::from_secs(1), || wallet.cached_balance().is_some()).await);

    h.explorer.respond(vec![explorer_tx("feed", OTHER, A, 1, 51)]);
    h.provider.set_balance(A, 101);
    assert!(h.provider.emit_block(51).await);

    assert_eq!(next_notification(&mut rx).await.hash, "feed");

    shutdown.trigger();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_block_poll() {
    let h = harness(30);
    h.tracker.registry().add_wallet(SEPOLIA, A).unwrap();

    let shutdown = wallet_tracker::Shutdown::new();
    let handles = h.tracker.spawn_pollers(&shutdown);
    assert!(common::wait_until(Duration::from_secs(1), || h.provider.has_subscriber()).await);

    h.provider.stall(true);
    assert!(h.provider.emit_block(60).await);
    assert!(common::wait_until(Duration::from_secs(1), || !h.provider.balance_calls.lock().unwrap().is_empty()).await);

    shutdown.trigger();
    for handle in handles {
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_add_wallet_sets_baseline_and_reports_status() {
    let h = harness(30);
    let mut rx = h.tracker.relay().subscribe();
    h.provider.set_balance(A, 42);
    h.explorer.respond(vec![explorer_tx("latest", OTHER, A, 42, 900)]);

    let added = h.tracker.add_wallet(SEPOLIA, A).await.unwrap();
    assert!(added.newly_added);
    assert_eq!(added.balance.as_deref(), Some("42"));
    assert_eq!(added.latest_timestamp, "1700000900");

    match rx.try_recv().unwrap() {
        RelayEvent::WalletStatus(status) => {
            assert!(status.tracked);
            assert_eq!(status.balance.as_deref(), Some("42"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    // The baseline came from registration, so the next poll at 42 is unchanged.
    let summary = h.tracker.poller(SEPOLIA).poll_block(901).await;
    assert_eq!(summary.changed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_add_wallet_errors() {
    let h = harness(30);
    assert!(matches!(
        h.tracker.add_wallet(5, A).await,
        Err(wallet_tracker::tracker::TrackerError::UnknownChain(5))
    ));
    assert!(h.tracker.add_wallet(SEPOLIA, "not-an-address").await.is_err());
    assert_eq!(h.tracker.registry().wallet_count(), 0);
}
