//! Outbound message delivery to end users.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("delivery request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("delivery rejected with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), SinkError>;
}

/// Writes messages to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), SinkError> {
        tracing::info!(chat_id, message = %text, "Delivering message");
        Ok(())
    }
}

/// POSTs `{"chat_id": .., "text": ..}` to a webhook.
#[derive(Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl MessageSink for WebhookSink {
    async fn deliver(&self, chat_id: i64, text: &str) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}
