//! Address spelling rules for EVM chains.
//!
//! Hex case carries no meaning on EVM chains: checksummed and lowercase
//! spellings name the same account. Everything inside the tracker keys
//! wallets by the lowercase `0x`-prefixed form.

use alloy::primitives::{hex, Address};

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Parse `address` and return its canonical lowercase spelling.
pub fn normalize_address(address: &str) -> BlockchainResult<String> {
    let parsed: Address = address
        .trim()
        .parse()
        .map_err(|_| BlockchainError::InvalidAddress(address.to_string()))?;
    Ok(hex::encode_prefixed(parsed))
}

/// Whether two spellings name the same address.
///
/// Values that do not parse as addresses (contract creations report an
/// empty `to`) fall back to a case-insensitive comparison.
pub fn same_address(a: &str, b: &str) -> bool {
    match (a.trim().parse::<Address>(), b.trim().parse::<Address>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    const LOWER: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    #[test]
    fn test_normalize_lowercases() {
        assert_eq!(normalize_address(CHECKSUMMED).unwrap(), LOWER);
        assert_eq!(normalize_address(LOWER).unwrap(), LOWER);
        assert_eq!(normalize_address(&format!(" {} ", LOWER)).unwrap(), LOWER);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(matches!(
            normalize_address("not-an-address"),
            Err(BlockchainError::InvalidAddress(_))
        ));
        assert!(normalize_address("0x1234").is_err());
    }

    #[test]
    fn test_same_address_ignores_case() {
        assert!(same_address(CHECKSUMMED, LOWER));
        assert!(!same_address(LOWER, "0x0000000000000000000000000000000000000001"));
        assert!(!same_address(LOWER, ""));
        assert!(same_address("", ""));
    }
}
