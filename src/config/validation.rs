//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check chain uniqueness and endpoint URLs
//! - Validate value ranges (capacities > 0, bind address parses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TrackerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{SubscriberConfig, TrackerConfig};

/// A single semantic problem found in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g., "chains[0].rpc_url").
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the tracking core configuration.
pub fn validate_config(config: &TrackerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.relay.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "relay.bind_address",
            format!("'{}' is not a socket address", config.relay.bind_address),
        ));
    }
    if config.relay.channel_capacity == 0 {
        errors.push(ValidationError::new("relay.channel_capacity", "must be greater than 0"));
    }
    if config.poller.balance_concurrency == 0 {
        errors.push(ValidationError::new("poller.balance_concurrency", "must be greater than 0"));
    }
    if config.chains.is_empty() {
        errors.push(ValidationError::new("chains", "at least one chain must be configured"));
    }

    let mut seen = HashSet::new();
    for (i, chain) in config.chains.iter().enumerate() {
        if !seen.insert(chain.chain_id) {
            errors.push(ValidationError::new(
                format!("chains[{}].chain_id", i),
                format!("duplicate chain id {}", chain.chain_id),
            ));
        }
        if url::Url::parse(&chain.rpc_url).is_err() {
            errors.push(ValidationError::new(
                format!("chains[{}].rpc_url", i),
                format!("invalid URL '{}'", chain.rpc_url),
            ));
        }
        for (j, failover) in chain.failover_urls.iter().enumerate() {
            if url::Url::parse(failover).is_err() {
                errors.push(ValidationError::new(
                    format!("chains[{}].failover_urls[{}]", i, j),
                    format!("invalid URL '{}'", failover),
                ));
            }
        }
        if url::Url::parse(&chain.explorer_url).is_err() {
            errors.push(ValidationError::new(
                format!("chains[{}].explorer_url", i),
                format!("invalid URL '{}'", chain.explorer_url),
            ));
        }
        if chain.block_poll_interval_ms == 0 {
            errors.push(ValidationError::new(
                format!("chains[{}].block_poll_interval_ms", i),
                "must be greater than 0",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the subscriber peer configuration.
pub fn validate_subscriber_config(config: &SubscriberConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match url::Url::parse(&config.tracker_ws_url) {
        Ok(url) if url.scheme() == "ws" || url.scheme() == "wss" => {}
        _ => errors.push(ValidationError::new(
            "tracker_ws_url",
            format!("'{}' is not a ws:// or wss:// URL", config.tracker_ws_url),
        )),
    }
    if let Some(webhook) = &config.webhook_url {
        if url::Url::parse(webhook).is_err() {
            errors.push(ValidationError::new("webhook_url", format!("invalid URL '{}'", webhook)));
        }
    }
    if config.store_path.is_empty() {
        errors.push(ValidationError::new("store_path", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
