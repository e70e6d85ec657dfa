//! Transaction notifications emitted by the reconstructor.

use serde::{Deserialize, Serialize};

use crate::blockchain::{same_address, ExplorerTransaction};

/// Direction of a transaction relative to the tracked wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// `In` when the wallet is the recipient, otherwise `Out`.
    pub fn classify(wallet: &str, recipient: &str) -> Self {
        if same_address(wallet, recipient) {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// One reconstructed transaction of a tracked wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub wallet_address: String,
    pub chain_id: u64,
    pub direction: Direction,
    pub from: String,
    pub to: String,
    /// Decimal string in the chain's smallest unit.
    pub value: String,
    pub method: String,
    pub timestamp: String,
    pub hash: String,
}

impl Notification {
    pub fn from_transaction(wallet: &str, chain_id: u64, tx: &ExplorerTransaction) -> Self {
        Self {
            wallet_address: wallet.to_string(),
            chain_id,
            direction: Direction::classify(wallet, &tx.to),
            from: tx.from.clone(),
            to: tx.to.clone(),
            value: tx.value.clone(),
            method: method_label(&tx.method_id, &tx.function_name),
            timestamp: tx.timestamp.clone(),
            hash: tx.hash.clone(),
        }
    }
}

/// Human label for the invoked method.
///
/// Plain transfers carry an empty selector (`0x`). Otherwise the decoded
/// function name is split on capitalization (`swapExactTokensForETH` becomes
/// "Swap Exact Tokens For ETH"), falling back to the raw selector.
pub fn method_label(method_id: &str, function_name: &str) -> String {
    if method_id.is_empty() || method_id == "0x" {
        return "Transfer".to_string();
    }
    let name = function_name.split('(').next().unwrap_or_default().trim();
    if !name.is_empty() {
        return split_camel_case(name);
    }
    method_id.to_string()
}

fn split_camel_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut label = String::with_capacity(name.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            if !label.ends_with(' ') && !label.is_empty() {
                label.push(' ');
            }
            continue;
        }
        if i > 0 && c.is_uppercase() && !label.ends_with(' ') {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                label.push(' ');
            }
        }
        if label.is_empty() || label.ends_with(' ') {
            label.extend(c.to_uppercase());
        } else {
            label.push(c);
        }
    }

    label.trim().to_string()
}
