//! Relay server: WebSocket endpoint for subscriber peers plus the wallet HTTP API.
//!
//! # Responsibilities
//! - Accept peer connections on `/ws` and run the sync handshake
//! - Forward relay events (`NEW_TRANSACTION`, `WALLET_STATUS_UPDATE`) to every peer
//! - Apply `WALLETS_TO_TRACK` additively to the registry
//! - Serve `POST /wallet`, `DELETE /wallet` and `GET /health`

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::blockchain::BlockchainError;
use crate::config::RelayConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::relay::messages::RelayMessage;
use crate::relay::session::SyncSession;
use crate::tracker::{Tracker, TrackerError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Tracker>,
    pub shutdown: Shutdown,
}

/// Body of the wallet mutation endpoints.
#[derive(Debug, Deserialize)]
pub struct WalletRequest {
    pub address: String,
    pub chain: u64,
}

pub struct RelayServer {
    router: Router,
    config: RelayConfig,
}

impl RelayServer {
    pub fn new(tracker: Arc<Tracker>, config: RelayConfig, shutdown: Shutdown) -> Self {
        let state = AppState { tracker, shutdown };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    #[allow(deprecated)]
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        let api = Router::new()
            .route("/wallet", post(add_wallet).delete(remove_wallet))
            .route("/health", get(health))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)));

        Router::new()
            .route("/ws", get(ws_handler))
            .merge(api)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// The configured router, for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Relay server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "status": "error", "message": message.into() }))).into_response()
}

fn tracker_error_response(error: TrackerError) -> Response {
    match error {
        TrackerError::UnknownChain(_) | TrackerError::Blockchain(BlockchainError::InvalidAddress(_)) => {
            error_response(StatusCode::BAD_REQUEST, error.to_string())
        }
        TrackerError::Blockchain(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

/// Unwrap a wallet request body, answering malformed ones with the error envelope.
fn wallet_request(payload: Result<Json<WalletRequest>, JsonRejection>) -> Result<WalletRequest, Response> {
    match payload {
        Ok(Json(request)) if request.address.trim().is_empty() => Err(error_response(
            StatusCode::BAD_REQUEST,
            "Address and chain are required",
        )),
        Ok(Json(request)) => Ok(request),
        Err(rejection) => Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Address and chain are required: {}", rejection.body_text()),
        )),
    }
}

async fn add_wallet(
    State(state): State<AppState>,
    payload: Result<Json<WalletRequest>, JsonRejection>,
) -> Response {
    let request = match wallet_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.tracker.add_wallet(request.chain, &request.address).await {
        Ok(added) => (StatusCode::OK, Json(json!({ "status": "success", "data": added }))).into_response(),
        Err(e) => {
            tracing::warn!(chain_id = request.chain, wallet = %request.address, error = %e, "Add wallet rejected");
            tracker_error_response(e)
        }
    }
}

async fn remove_wallet(
    State(state): State<AppState>,
    payload: Result<Json<WalletRequest>, JsonRejection>,
) -> Response {
    let request = match wallet_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match state.tracker.remove_wallet(request.chain, &request.address) {
        Ok(removed) => (
            StatusCode::OK,
            Json(json!({ "status": "success", "data": { "removed": removed } })),
        )
            .into_response(),
        Err(e) => tracker_error_response(e),
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "chains": state.tracker.registry().all_chains(),
        "wallets": state.tracker.registry().wallet_count(),
        "peers": state.tracker.relay().subscriber_count(),
        "pendingReconstructions": state.tracker.scheduler().pending_count(),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| peer_session(socket, state))
}

/// Drive one peer connection until it closes or the process shuts down.
async fn peer_session(socket: WebSocket, state: AppState) {
    let peer_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.tracker.relay().subscribe();
    let mut shutdown = state.shutdown.subscribe();
    let mut session = SyncSession::new();

    metrics::record_peer_connected();
    tracing::info!(peer = %peer_id, "Peer connected, requesting wallets");

    let opener = session.connect();
    if sender.send(Message::Text(opener.encode().into())).await.is_ok() {
        loop {
            tokio::select! {
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_frame(&mut session, &state.tracker, text.as_str(), peer_id) {
                            if sender.send(Message::Text(reply.encode().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(peer = %peer_id, error = %e, "Peer connection error");
                        break;
                    }
                },
                event = events.recv() => match event {
                    Ok(event) => {
                        let message: RelayMessage = event.into();
                        if sender.send(Message::Text(message.encode().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(peer = %peer_id, skipped, "Peer lagging, relay events dropped");
                        metrics::record_relay_dropped("lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.recv() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    session.disconnect();
    metrics::record_peer_disconnected();
    tracing::info!(peer = %peer_id, "Peer disconnected");
}

/// Handle one inbound text frame; returns an optional reply.
fn handle_frame(session: &mut SyncSession, tracker: &Tracker, text: &str, peer_id: Uuid) -> Option<RelayMessage> {
    match RelayMessage::decode(text) {
        Ok(RelayMessage::WalletsToTrack(wallets)) => {
            let added = tracker.apply_wallet_set(&wallets);
            let previous = session.wallet_set_exchanged();
            tracing::info!(peer = %peer_id, added, from = %previous, to = %session.state(), "Received wallets to track");
            None
        }
        Ok(RelayMessage::Error { message }) => {
            tracing::warn!(peer = %peer_id, message = %message, "Peer reported error");
            None
        }
        Ok(other) => {
            tracing::warn!(peer = %peer_id, event = other.name(), "Unhandled event from peer");
            Some(RelayMessage::Error {
                message: format!("unexpected event {}", other.name()),
            })
        }
        Err(e) => {
            tracing::warn!(peer = %peer_id, error = %e, "Malformed frame from peer");
            Some(RelayMessage::Error {
                message: format!("malformed frame: {}", e),
            })
        }
    }
}
