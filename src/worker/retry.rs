//! Backoff for transient receive failures

use std::time::Duration;

/// Backoff applied while the channel keeps failing with retryable errors.
///
/// There is no attempt limit: a retryable failure never ends the receive
/// loop, only shutdown or a non-retryable error does.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry, doubled on each retry (default: 250ms)
    pub base_delay: Duration,
    /// Upper bound for a single delay (default: 10 seconds)
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        std::cmp::min(
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
            self.max_delay,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_is_capped() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_for(0), Duration::from_millis(250));
        assert_eq!(retry.delay_for(2), Duration::from_secs(1));
        assert_eq!(retry.delay_for(10), Duration::from_secs(10));
        assert_eq!(retry.delay_for(40), Duration::from_secs(10));
        assert_eq!(retry.delay_for(u32::MAX), Duration::from_secs(10));
    }
}
