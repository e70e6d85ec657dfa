//! Wallet tracker core process.
//!
//! # Architecture Overview
//!
//! ```text
//!     ┌──────────────────────────────── WALLET TRACKER ────────────────────────────────┐
//!     │                                                                                 │
//!     │  ┌──────────┐  new block  ┌────────┐  balances  ┌──────────┐  change  ┌───────┐ │
//!     │  │ provider │────────────▶│ poller │───────────▶│ detector │─────────▶│ timer │ │
//!     │  └──────────┘             └────────┘            └──────────┘          └───┬───┘ │
//!     │                               ▲                                           │     │
//!     │                               │ snapshot                        30s later ▼     │
//!     │                          ┌──────────┐  membership  ┌──────────────────────────┐ │
//!     │                          │ registry │◀─────────────│ reconstructor (explorer) │ │
//!     │                          └──────────┘              └────────────┬─────────────┘ │
//!     │                               ▲ WALLETS_TO_TRACK                │ notifications │
//!     │                               │                                 ▼               │
//!     │                          ┌─────────────────────────────────────────────┐        │
//!     │   POST/DELETE /wallet ──▶│ relay server (HTTP API + /ws broadcast hub) │        │
//!     │                          └──────────────────────┬──────────────────────┘        │
//!     └─────────────────────────────────────────────────┼───────────────────────────────┘
//!                                                       ▼
//!                                               subscriber peer
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use wallet_tracker::blockchain::{AlloyChainProvider, EtherscanExplorer};
use wallet_tracker::config::load_config;
use wallet_tracker::lifecycle::{wait_for_signal, Shutdown};
use wallet_tracker::observability::{logging, metrics};
use wallet_tracker::relay::{NotificationRelay, RelayServer};
use wallet_tracker::tracker::{Tracker, WalletRegistry};

#[derive(Parser)]
#[command(name = "wallet-tracker")]
#[command(about = "Tracks wallet balances and relays reconstructed transactions", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Chains are only configured there.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("wallet-tracker v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.relay.bind_address,
        chains = config.chains.len(),
        delay_secs = config.reconstruction.delay_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let registry = Arc::new(WalletRegistry::new());
    for chain in &config.chains {
        let provider = AlloyChainProvider::connect(chain.clone()).await?;
        registry.register_chain(Arc::new(provider));
        for address in &chain.wallets {
            registry.add_wallet(chain.chain_id, address)?;
        }
        tracing::info!(chain_id = chain.chain_id, seeded = chain.wallets.len(), "Chain registered");
    }

    let explorer_timeout = config
        .chains
        .iter()
        .map(|c| c.rpc_timeout_secs)
        .max()
        .unwrap_or(10);
    let explorer = EtherscanExplorer::new(&config.chains, Duration::from_secs(explorer_timeout))?;

    let relay = NotificationRelay::new(config.relay.channel_capacity);
    let tracker = Arc::new(Tracker::new(
        registry,
        Arc::new(explorer),
        relay,
        config.poller.clone(),
        &config.reconstruction,
    ));

    let shutdown = Shutdown::new();
    let pollers = tracker.spawn_pollers(&shutdown);

    let listener = TcpListener::bind(&config.relay.bind_address).await?;
    let server = RelayServer::new(tracker.clone(), config.relay.clone(), shutdown.clone());
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();

    for poller in pollers {
        let _ = poller.await;
    }
    match server_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "Relay server failed"),
        Err(e) => tracing::error!(error = %e, "Relay server task panicked"),
        Ok(Ok(())) => {}
    }
    tracker.shutdown();

    tracing::info!("Shutdown complete");
    Ok(())
}
