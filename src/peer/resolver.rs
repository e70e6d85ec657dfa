//! Subscriber resolution: maps an inbound notification to the users
//! subscribed to its wallet and delivers one message each.
//!
//! Failures are isolated per subscriber. A missing user record or a failed
//! delivery is logged and the remaining subscribers are still served.

use std::sync::Arc;
use thiserror::Error;

use crate::peer::sink::{MessageSink, SinkError};
use crate::peer::store::{StoreError, Subscription, SubscriptionStore};
use crate::tracker::Notification;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("user {0} not found")]
    MissingUser(u64),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Outcome of one notification.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct SubscriberResolver {
    store: Arc<dyn SubscriptionStore>,
    sink: Arc<dyn MessageSink>,
}

impl SubscriberResolver {
    pub fn new(store: Arc<dyn SubscriptionStore>, sink: Arc<dyn MessageSink>) -> Self {
        Self { store, sink }
    }

    pub async fn on_notification(&self, notification: &Notification) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let subscriptions = match self.store.subscriptions_for(&notification.wallet_address).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(wallet = %notification.wallet_address, error = %e, "Failed to look up subscribers");
                return report;
            }
        };

        if subscriptions.is_empty() {
            tracing::debug!(wallet = %notification.wallet_address, "No subscribers for wallet");
        }

        for subscription in &subscriptions {
            match self.notify(subscription, notification).await {
                Ok(()) => {
                    report.delivered += 1;
                    tracing::info!(user_id = subscription.user_id, hash = %notification.hash, "Notification sent");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        user_id = subscription.user_id,
                        subscription = subscription.id,
                        error = %e,
                        "Failed sending notification to user"
                    );
                }
            }
        }

        report
    }

    async fn notify(&self, subscription: &Subscription, notification: &Notification) -> Result<(), ResolveError> {
        let user = self
            .store
            .user(subscription.user_id)
            .await?
            .ok_or(ResolveError::MissingUser(subscription.user_id))?;

        let text = format_message(&subscription.name, notification);
        self.sink.deliver(user.chat_id, &text).await?;
        Ok(())
    }
}

pub fn format_message(wallet_name: &str, notification: &Notification) -> String {
    format!(
        "New transaction for wallet *{}*\nDirection: {}\nMethod: {}\nValue: {}\nHash: {}",
        wallet_name, notification.direction, notification.method, notification.value, notification.hash
    )
}
