//! In-process fan-out of relay events.
//!
//! The tracker publishes into a bounded broadcast channel; every connected
//! peer session (or any other consumer) holds its own receiver. Publishing
//! never waits: with no receivers the event is dropped, and a receiver that
//! falls behind loses the oldest events.

use tokio::sync::broadcast;

use crate::observability::metrics;
use crate::relay::messages::{RelayMessage, WalletStatus};
use crate::tracker::Notification;

/// Event fanned out to relay subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Transaction(Notification),
    WalletStatus(WalletStatus),
}

impl From<RelayEvent> for RelayMessage {
    fn from(event: RelayEvent) -> Self {
        match event {
            RelayEvent::Transaction(n) => RelayMessage::NewTransaction(n),
            RelayEvent::WalletStatus(s) => RelayMessage::WalletStatusUpdate(s),
        }
    }
}

/// Outbound notification channel of the tracking core.
#[derive(Debug, Clone)]
pub struct NotificationRelay {
    tx: broadcast::Sender<RelayEvent>,
}

impl NotificationRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Attach a new consumer. It receives events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Number of attached consumers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event. Returns false if it was dropped for lack of consumers.
    pub fn publish(&self, event: RelayEvent) -> bool {
        let kind = match &event {
            RelayEvent::Transaction(_) => "transaction",
            RelayEvent::WalletStatus(_) => "wallet_status",
        };
        match self.tx.send(event) {
            Ok(_) => true,
            Err(broadcast::error::SendError(event)) => {
                match event {
                    RelayEvent::Transaction(n) => tracing::warn!(
                        hash = %n.hash,
                        wallet = %n.wallet_address,
                        "No relay peer connected, dropping transaction notification"
                    ),
                    RelayEvent::WalletStatus(s) => tracing::warn!(
                        wallet = %s.address,
                        "No relay peer connected, dropping wallet status update"
                    ),
                }
                metrics::record_relay_dropped(kind);
                false
            }
        }
    }

    pub fn publish_notification(&self, notification: Notification) -> bool {
        self.publish(RelayEvent::Transaction(notification))
    }

    pub fn publish_status(&self, status: WalletStatus) -> bool {
        self.publish(RelayEvent::WalletStatus(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Direction;

    fn notification(hash: &str) -> Notification {
        Notification {
            wallet_address: "0xA".into(),
            chain_id: 1,
            direction: Direction::In,
            from: "0xB".into(),
            to: "0xA".into(),
            value: "1".into(),
            method: "Transfer".into(),
            timestamp: "0".into(),
            hash: hash.into(),
        }
    }

    #[test]
    fn test_publish_without_subscribers_drops() {
        let relay = NotificationRelay::new(4);
        assert!(!relay.publish_notification(notification("0x1")));
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let relay = NotificationRelay::new(4);
        let mut a = relay.subscribe();
        let mut b = relay.subscribe();
        assert_eq!(relay.subscriber_count(), 2);

        assert!(relay.publish_notification(notification("0x1")));

        assert_eq!(a.recv().await.unwrap(), RelayEvent::Transaction(notification("0x1")));
        assert_eq!(b.recv().await.unwrap(), RelayEvent::Transaction(notification("0x1")));
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_bounded() {
        let relay = NotificationRelay::new(2);
        let mut rx = relay.subscribe();
        for i in 0..5 {
            relay.publish_notification(notification(&format!("0x{}", i)));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(rx.recv().await.unwrap(), RelayEvent::Transaction(notification("0x3")));
    }

    #[test]
    fn test_event_to_message() {
        let status = WalletStatus {
            address: "0xA".into(),
            chain_id: 1,
            tracked: false,
            balance: None,
        };
        let message: RelayMessage = RelayEvent::WalletStatus(status.clone()).into();
        assert_eq!(message, RelayMessage::WalletStatusUpdate(status));
    }
}
