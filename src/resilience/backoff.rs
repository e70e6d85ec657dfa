//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped at
/// `max`, plus up to 10% jitter. Attempt 0 means no delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let first = calculate_backoff(1, 500, 30_000);
        assert!(first.as_millis() >= 500 && first.as_millis() < 550);

        let third = calculate_backoff(3, 500, 30_000);
        assert!(third.as_millis() >= 2000 && third.as_millis() < 2200);

        let capped = calculate_backoff(20, 500, 30_000);
        assert!(capped.as_millis() >= 30_000 && capped.as_millis() < 33_000);
    }

    #[test]
    fn test_zeroth_attempt_is_immediate() {
        assert_eq!(calculate_backoff(0, 500, 30_000), Duration::ZERO);
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        assert!(calculate_backoff(u32::MAX, u64::MAX, 1000).as_millis() >= 1000);
    }
}
