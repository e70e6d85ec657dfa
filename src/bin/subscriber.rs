//! Subscriber-facing peer process.
//!
//! Connects to the tracking core's relay, answers wallet-set requests from the
//! local subscription store, and delivers every relayed transaction to the
//! subscribed users. SIGHUP reloads the store file and pushes the new wallet
//! set to the core.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use wallet_tracker::config::{load_subscriber_config, SubscriberConfig};
use wallet_tracker::lifecycle::{wait_for_signal, ReloadSignal, Shutdown};
use wallet_tracker::observability::logging;
use wallet_tracker::peer::{JsonSubscriptionStore, LogSink, MessageSink, SubscriberResolver, WebhookSink};
use wallet_tracker::relay::{RelayClient, RelayClientHandle};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "subscriber")]
#[command(about = "Delivers wallet tracker notifications to subscribed users", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_subscriber_config(path)?,
        None => SubscriberConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(tracker = %config.tracker_ws_url, store = %config.store_path, "subscriber starting");

    let store = Arc::new(JsonSubscriptionStore::load_from_file(&config.store_path)?);
    let sink: Arc<dyn MessageSink> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url.clone(), WEBHOOK_TIMEOUT)?),
        None => {
            tracing::info!("No webhook configured, messages are logged only");
            Arc::new(LogSink)
        }
    };
    let resolver = Arc::new(SubscriberResolver::new(store.clone(), sink));

    let client = RelayClient::new(
        config.tracker_ws_url.clone(),
        store.clone(),
        resolver,
        config.reconnect.clone(),
    );

    let handle = client.handle();

    let shutdown = Shutdown::new();
    let client_task = tokio::spawn(client.run(shutdown.subscribe()));
    let reload_task = tokio::spawn(reload_on_hangup(store.clone(), handle, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    let _ = client_task.await;
    let _ = reload_task.await;

    if let Err(e) = store.save_to_file() {
        tracing::error!(error = %e, "Failed to save subscription store");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Re-read the store on every SIGHUP and tell the core about added wallets.
async fn reload_on_hangup(
    store: Arc<JsonSubscriptionStore>,
    handle: RelayClientHandle,
    mut stop: broadcast::Receiver<()>,
) {
    let mut reloads = ReloadSignal::new();
    loop {
        tokio::select! {
            _ = reloads.recv() => {}
            _ = stop.recv() => return,
        }

        if let Err(e) = store.reload() {
            tracing::error!(error = %e, "Failed to reload subscription store");
            continue;
        }
        match handle.push_wallet_set().await {
            Ok(true) => tracing::info!("Pushed reloaded wallet set"),
            Ok(false) => tracing::info!("Not connected, wallet set goes out on next handshake"),
            Err(e) => tracing::error!(error = %e, "Failed to read wallet set"),
        }
    }
}
