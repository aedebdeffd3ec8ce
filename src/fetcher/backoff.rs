use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Exponential backoff with jitter for the retry after `attempt` (0-based):
/// `base * factor^attempt`, capped at `max_delay`, then ±20% jitter.
pub fn calculate_backoff_delay(attempt: u32, retry: &RetryConfig) -> Duration {
    // Cap the exponent to prevent overflow
    let capped_attempt = attempt.min(16);

    let base_ms = u64::try_from(retry.base_delay.as_millis()).unwrap_or(u64::MAX);
    let multiplier = u64::from(retry.factor).saturating_pow(capped_attempt);
    let max_ms = u64::try_from(retry.max_delay.as_millis()).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

    if delay_ms == 0 {
        return Duration::ZERO;
    }

    let jitter_factor = rand::thread_rng().gen_range(0.8..1.2);
    let delay_with_jitter = (delay_ms as f64 * jitter_factor).round() as u64;

    Duration::from_millis(delay_with_jitter.min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry(base_ms: u64, max_ms: u64) -> RetryConfig {
        RetryConfig {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_backoff_progression() {
        let cfg = retry(1000, 10_000);

        let delay0 = calculate_backoff_delay(0, &cfg).as_millis();
        let delay1 = calculate_backoff_delay(1, &cfg).as_millis();
        let delay2 = calculate_backoff_delay(2, &cfg).as_millis();

        // Delays should be in expected ranges with jitter
        assert!((800..=1200).contains(&delay0)); // 1s ±20%
        assert!((1600..=2400).contains(&delay1)); // 2s ±20%
        assert!((3200..=4800).contains(&delay2)); // 4s ±20%
    }

    #[test]
    fn test_backoff_cap() {
        let cfg = retry(1000, 10_000);

        // Very high attempt numbers never exceed the configured ceiling
        let delay_high = calculate_backoff_delay(30, &cfg);
        assert!(delay_high <= Duration::from_secs(10));
        assert!(delay_high >= Duration::from_secs(8));
    }

    #[test]
    fn test_zero_base_means_no_wait() {
        assert_eq!(calculate_backoff_delay(2, &retry(0, 10_000)), Duration::ZERO);
    }
}
