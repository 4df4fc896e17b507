//! Retry bounds for step invocations.

use crate::backend::ProviderError;
use crate::config::SupervisorConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; later retries wait proportionally longer.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.max(1)
    }

    /// Whether a failure on the given (1-based) attempt earns another try.
    pub fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        is_retryable(error) && attempt <= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default())
    }
}

pub fn is_retryable(error: &ProviderError) -> bool {
    error.is_transient()
}
