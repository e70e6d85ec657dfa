//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tracker_balance_changes_total` (counter): detected balance changes, by chain
//! - `tracker_notifications_total` (counter): emitted notifications, by chain and direction
//! - `tracker_explorer_failures_total` (counter): failed history fetches, by chain
//! - `tracker_relay_dropped_total` (counter): relay events not delivered, by reason
//! - `tracker_wallets` (gauge): tracked wallets, by chain
//! - `tracker_connected_peers` (gauge): open relay peer connections
//!
//! Recording without an installed exporter is a no-op.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::tracker::Direction;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_balance_change(chain_id: u64) {
    counter!("tracker_balance_changes_total", "chain" => chain_id.to_string()).increment(1);
}

pub fn record_notification(chain_id: u64, direction: Direction) {
    counter!(
        "tracker_notifications_total",
        "chain" => chain_id.to_string(),
        "direction" => direction.to_string()
    )
    .increment(1);
}

pub fn record_explorer_failure(chain_id: u64) {
    counter!("tracker_explorer_failures_total", "chain" => chain_id.to_string()).increment(1);
}

pub fn record_relay_dropped(reason: &'static str) {
    counter!("tracker_relay_dropped_total", "reason" => reason).increment(1);
}

pub fn record_tracked_wallets(chain_id: u64, count: usize) {
    gauge!("tracker_wallets", "chain" => chain_id.to_string()).set(count as f64);
}

pub fn record_peer_connected() {
    gauge!("tracker_connected_peers").increment(1.0);
}

pub fn record_peer_disconnected() {
    gauge!("tracker_connected_peers").decrement(1.0);
}
