use std::time::Duration;

/// How often, and how patiently, an operation is retried.
///
/// `max_retries` counts retries after the first attempt, so an operation runs
/// at most `max_retries + 1` times. The delay before retry `n` (starting at 0)
/// is `base_delay * multiplier^n`, capped at `max_delay`, plus up to `jitter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Same delay before every retry.
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            multiplier: 1,
            jitter: Duration::ZERO,
        }
    }

    /// Doubling delay with a little jitter, for retries against peers.
    pub fn exponential(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            multiplier: 2,
            jitter: Duration::from_millis(50),
        }
    }

    /// Retries without sleeping.
    pub fn immediate(max_retries: u32) -> Self {
        Self::fixed(Duration::ZERO, max_retries)
    }

    /// One probe per second for `timeout_secs` seconds.
    pub fn per_second(timeout_secs: u32) -> Self {
        Self::fixed(Duration::from_secs(1), timeout_secs)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(retry);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);

        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::random::<u64>() % jitter_ms)
    }

    pub async fn wait(&self, retry: u32) {
        let delay = self.delay_for(retry);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::per_second(DEFAULT_DISCOVERY_TIMEOUT_SECS)
    }
}

pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u32 = 10;
