//! Relay client run by the subscriber-facing peer.
//!
//! Keeps a WebSocket connection to the tracking core alive, reconnecting
//! with exponential backoff. On every connection the sync handshake starts
//! over: the core sends `REQUEST_WALLETS` and the client answers with the
//! store's full wallet set. Inbound notifications are handed, in arrival
//! order, to the subscriber resolver.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::config::ReconnectConfig;
use crate::peer::{StoreError, SubscriberResolver, SubscriptionStore};
use crate::relay::messages::RelayMessage;
use crate::relay::session::{SyncSession, SyncState};
use crate::resilience::backoff::calculate_backoff;
use crate::tracker::Notification;

const OUTBOUND_CAPACITY: usize = 64;
const DELIVERY_CAPACITY: usize = 1024;
/// How long queued notifications may keep draining after shutdown.
const DELIVERY_DRAIN: Duration = Duration::from_secs(2);

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Lost,
    Shutdown,
}

/// Cloneable handle for sending to the tracking core and observing the
/// connection state.
#[derive(Clone)]
pub struct RelayClientHandle {
    outbound: mpsc::Sender<RelayMessage>,
    state: watch::Receiver<SyncState>,
    store: Arc<dyn SubscriptionStore>,
}

impl RelayClientHandle {
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for(&self, target: SyncState) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == target).await;
    }

    /// Queue a message for the core. Dropped with a warning when disconnected.
    pub fn send(&self, message: RelayMessage) -> bool {
        if self.state() == SyncState::Disconnected {
            tracing::warn!(event = message.name(), "Cannot send message, relay not connected");
            return false;
        }
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Relay outbound queue unavailable, message dropped");
                false
            }
        }
    }

    /// Push the store's current wallet set after a local subscription change.
    /// The subscriber process calls this when its store is reloaded.
    pub async fn push_wallet_set(&self) -> Result<bool, StoreError> {
        let wallets = self.store.wallets_to_track().await?;
        Ok(self.send(RelayMessage::WalletsToTrack(wallets)))
    }
}

pub struct RelayClient {
    url: String,
    store: Arc<dyn SubscriptionStore>,
    resolver: Arc<SubscriberResolver>,
    reconnect: ReconnectConfig,
    session: SyncSession,
    state_tx: watch::Sender<SyncState>,
    outbound_tx: mpsc::Sender<RelayMessage>,
    outbound_rx: mpsc::Receiver<RelayMessage>,
}

impl RelayClient {
    pub fn new(
        url: impl Into<String>,
        store: Arc<dyn SubscriptionStore>,
        resolver: Arc<SubscriberResolver>,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        Self {
            url: url.into(),
            store,
            resolver,
            reconnect,
            session: SyncSession::new(),
            state_tx,
            outbound_tx,
            outbound_rx,
        }
    }

    pub fn handle(&self) -> RelayClientHandle {
        RelayClientHandle {
            outbound: self.outbound_tx.clone(),
            state: self.state_tx.subscribe(),
            store: self.store.clone(),
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.session.state());
    }

    /// Connect, serve, and reconnect until shutdown.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_CAPACITY);
        let mut delivery = tokio::spawn(deliver_notifications(self.resolver.clone(), delivery_rx));

        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let delay = calculate_backoff(attempt, self.reconnect.base_delay_ms, self.reconnect.max_delay_ms);
                tracing::info!(attempt, delay = ?delay, "Reconnecting to tracking server");
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown.recv() => break,
                }
            }

            let connection = tokio::select! {
                result = connect_async(self.url.as_str()) => result,
                _ = shutdown.recv() => break,
            };

            match connection {
                Ok((ws, _)) => {
                    attempt = 1;
                    self.session.connect();
                    self.publish_state();
                    tracing::info!(url = %self.url, "Connected to tracking server");

                    let end = self.serve(ws, &delivery_tx, &mut shutdown).await;

                    self.session.disconnect();
                    self.publish_state();
                    if end == SessionEnd::Shutdown {
                        break;
                    }
                    tracing::warn!("Disconnected from tracking server");
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    tracing::warn!(url = %self.url, error = %e, "Connection error");
                }
            }
        }

        drop(delivery_tx);
        if timeout(DELIVERY_DRAIN, &mut delivery).await.is_err() {
            tracing::warn!("Notification delivery still busy at shutdown, abandoning queue");
            delivery.abort();
        }
        tracing::info!("Relay client stopped");
    }

    async fn serve(
        &mut self,
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        delivery: &mpsc::Sender<Notification>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        // A full delivery queue must not hold off shutdown.
                        let reply = tokio::select! {
                            reply = self.handle_frame(text.as_str(), delivery) => reply,
                            _ = shutdown.recv() => {
                                let _ = write.send(Message::Close(None)).await;
                                return SessionEnd::Shutdown;
                            }
                        };
                        if let Some(reply) = reply {
                            if write.send(Message::Text(reply.encode().into())).await.is_err() {
                                return SessionEnd::Lost;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Relay connection error");
                        return SessionEnd::Lost;
                    }
                },
                Some(message) = self.outbound_rx.recv() => {
                    let name = message.name();
                    if write.send(Message::Text(message.encode().into())).await.is_err() {
                        return SessionEnd::Lost;
                    }
                    if let RelayMessage::WalletsToTrack(_) = message {
                        self.session.wallet_set_exchanged();
                        self.publish_state();
                    }
                    tracing::debug!(event = name, "Sent message");
                }
                _ = shutdown.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    async fn handle_frame(&mut self, text: &str, delivery: &mpsc::Sender<Notification>) -> Option<RelayMessage> {
        let message = match RelayMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, frame = %text, "Unhandled event");
                return None;
            }
        };

        match message {
            RelayMessage::RequestWallets => {
                tracing::info!("Received wallet data request from the server, sending wallets");
                match self.store.wallets_to_track().await {
                    Ok(wallets) => {
                        self.session.wallet_set_exchanged();
                        self.publish_state();
                        Some(RelayMessage::WalletsToTrack(wallets))
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to load wallets to track");
                        None
                    }
                }
            }
            RelayMessage::NewTransaction(notification) => {
                tracing::info!(hash = %notification.hash, wallet = %notification.wallet_address, "New transaction detected");
                if delivery.send(notification).await.is_err() {
                    tracing::error!("Notification worker stopped, transaction dropped");
                }
                None
            }
            RelayMessage::WalletStatusUpdate(status) => {
                tracing::info!(wallet = %status.address, tracked = status.tracked, "Wallet status updated");
                None
            }
            RelayMessage::Error { message } => {
                tracing::error!(message = %message, "Server reported error");
                None
            }
            RelayMessage::WalletsToTrack(_) => {
                tracing::warn!("Unexpected WALLETS_TO_TRACK from server");
                None
            }
        }
    }
}

async fn deliver_notifications(resolver: Arc<SubscriberResolver>, mut rx: mpsc::Receiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        resolver.on_notification(&notification).await;
    }
}
