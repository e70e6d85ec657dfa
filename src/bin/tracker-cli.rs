use clap::{Parser, Subcommand};
use serde_json::Value;
use std::time::Duration;

use wallet_tracker::peer::TrackerApi;

#[derive(Parser)]
#[command(name = "tracker-cli")]
#[command(about = "Management CLI for the wallet tracker", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3001")]
    url: String,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a wallet
    Add {
        #[arg(long)]
        chain: u64,
        #[arg(long)]
        address: String,
    },
    /// Stop tracking a wallet
    Remove {
        #[arg(long)]
        chain: u64,
        #[arg(long)]
        address: String,
    },
    /// Show tracked chains, wallet count and connected peers
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let api = TrackerApi::new(cli.url, Duration::from_secs(cli.timeout))?;

    let result = match cli.command {
        Commands::Add { chain, address } => api.add_wallet(chain, &address).await,
        Commands::Remove { chain, address } => api.remove_wallet(chain, &address).await,
        Commands::Health => api.health().await,
    };

    match result {
        Ok(data) => print_value(&data)?,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn print_value(value: &Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
