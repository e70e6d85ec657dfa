//! Block explorer adapter: address transaction history.
//!
//! Talks to Etherscan-compatible `account/txlist` endpoints. Results are
//! always returned newest-first.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::blockchain::types::ExplorerError;
use crate::config::ChainConfig;

/// Upper bound passed as `endblock`; the explorer treats it as "latest".
const END_BLOCK: u64 = 99_999_999;

/// One transaction as reported by the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerTransaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Decimal string in the chain's smallest unit.
    pub value: String,
    #[serde(default)]
    pub method_id: String,
    #[serde(default)]
    pub function_name: String,
    #[serde(rename = "timeStamp")]
    pub timestamp: String,
    #[serde(deserialize_with = "u64_from_str")]
    pub block_number: u64,
}

fn u64_from_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Transaction-history query API of a block explorer.
#[async_trait]
pub trait BlockExplorer: Send + Sync {
    /// Transactions touching `address` on `chain_id` from `since_block` on, newest-first.
    async fn list_transactions(
        &self,
        address: &str,
        chain_id: u64,
        since_block: u64,
    ) -> Result<Vec<ExplorerTransaction>, ExplorerError>;

    /// Timestamp of the newest transaction of `address`, or `"0"` when it has none.
    async fn latest_timestamp(&self, address: &str, chain_id: u64) -> Result<String, ExplorerError> {
        let history = self.list_transactions(address, chain_id, 0).await?;
        Ok(history
            .first()
            .map(|tx| tx.timestamp.clone())
            .unwrap_or_else(|| "0".to_string()))
    }
}

#[derive(Debug, Clone)]
struct ExplorerEndpoint {
    url: String,
    api_key: String,
}

/// Etherscan-family explorer client covering every configured chain.
#[derive(Debug, Clone)]
pub struct EtherscanExplorer {
    client: reqwest::Client,
    endpoints: HashMap<u64, ExplorerEndpoint>,
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

impl EtherscanExplorer {
    pub fn new(chains: &[ChainConfig], request_timeout: Duration) -> Result<Self, ExplorerError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        let endpoints = chains
            .iter()
            .map(|c| {
                (
                    c.chain_id,
                    ExplorerEndpoint {
                        url: c.explorer_url.clone(),
                        api_key: c.explorer_api_key.clone(),
                    },
                )
            })
            .collect();

        Ok(Self { client, endpoints })
    }
}

/// Interpret an Etherscan envelope.
fn parse_envelope(response: EtherscanResponse) -> Result<Vec<ExplorerTransaction>, ExplorerError> {
    if response.status != "1" {
        // An address without history is reported as a failure with an empty result.
        if response.message.starts_with("No transactions found") {
            return Ok(Vec::new());
        }
        let detail = match response.result {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        return Err(ExplorerError::Api {
            message: response.message,
            detail,
        });
    }

    serde_json::from_value(response.result).map_err(|e| ExplorerError::Decode(e.to_string()))
}

#[async_trait]
impl BlockExplorer for EtherscanExplorer {
    async fn list_transactions(
        &self,
        address: &str,
        chain_id: u64,
        since_block: u64,
    ) -> Result<Vec<ExplorerTransaction>, ExplorerError> {
        let endpoint = self
            .endpoints
            .get(&chain_id)
            .ok_or(ExplorerError::UnsupportedChain(chain_id))?;

        let start_block = since_block.to_string();
        let end_block = END_BLOCK.to_string();
        let response: EtherscanResponse = self
            .client
            .get(&endpoint.url)
            .query(&[
                ("module", "account"),
                ("action", "txlist"),
                ("address", address),
                ("startblock", start_block.as_str()),
                ("endblock", end_block.as_str()),
                ("sort", "desc"),
                ("apikey", endpoint.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let transactions = parse_envelope(response)?;
        tracing::debug!(
            chain_id,
            wallet = %address,
            since_block,
            count = transactions.len(),
            "Fetched transaction history"
        );
        Ok(transactions)
    }
}
