//! HTTP client for the tracker's wallet API.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tracker returned {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct TrackerApi {
    client: reqwest::Client,
    base_url: String,
}

impl TrackerApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TrackerApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Register a wallet; returns the `data` payload (baseline balance, latest timestamp).
    pub async fn add_wallet(&self, chain_id: u64, address: &str) -> Result<Value, TrackerApiError> {
        let request = self
            .client
            .post(format!("{}/wallet", self.base_url))
            .json(&json!({ "address": address, "chain": chain_id }));
        unwrap_envelope(request.send().await?).await
    }

    pub async fn remove_wallet(&self, chain_id: u64, address: &str) -> Result<Value, TrackerApiError> {
        let request = self
            .client
            .delete(format!("{}/wallet", self.base_url))
            .json(&json!({ "address": address, "chain": chain_id }));
        unwrap_envelope(request.send().await?).await
    }

    pub async fn health(&self) -> Result<Value, TrackerApiError> {
        let response = self.client.get(format!("{}/health", self.base_url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrackerApiError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }
}

async fn unwrap_envelope(response: reqwest::Response) -> Result<Value, TrackerApiError> {
    let status = response.status();
    let envelope: Envelope = response.json().await?;
    if !status.is_success() || envelope.status != "success" {
        return Err(TrackerApiError::Api {
            status: status.as_u16(),
            message: envelope.message.unwrap_or(envelope.status),
        });
    }
    Ok(envelope.data)
}
