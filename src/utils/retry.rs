//! Retry utilities: backoff for optimistic-update conflicts.
//!
//! Uses `backon` for exponential backoff with jitter. A lost anchor race is
//! retried a small bounded number of times before it surfaces to the caller.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

/// Retry configuration for conflicting ledger writes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds.
    pub min_delay_ms: u64,
    /// Delay cap, in milliseconds.
    pub max_delay_ms: u64,
    /// Randomize delays to spread out competing writers.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay_ms: 10,
            max_delay_ms: 200,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Backoff for anchor/flag conflict retries.
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_retries);

        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}
