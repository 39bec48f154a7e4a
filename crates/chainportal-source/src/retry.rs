//! Retry schedule for transient portal failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use chainportal_core::error::PortalError;

/// Configuration for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before each retry, in order. The last entry repeats.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
}

fn default_max_retries() -> u32 {
    10
}

fn default_backoff_ms() -> Vec<u64> {
    vec![100, 500, 1_000, 2_000, 5_000]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), PortalError> {
        if self.max_retries == 0 {
            return Err(PortalError::Config("max_retries must be positive".into()));
        }
        if self.backoff_ms.is_empty() {
            return Err(PortalError::Config("backoff schedule must not be empty".into()));
        }
        Ok(())
    }
}

/// Stateless retry policy: maps an attempt number to its delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let idx = (attempt as usize - 1).min(self.config.backoff_ms.len().saturating_sub(1));
        let ms = self.config.backoff_ms.get(idx).copied()?;
        Some(Duration::from_millis(ms))
    }
}
