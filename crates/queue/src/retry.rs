//! Retry configuration for scan jobs.

#![allow(missing_docs)]

use std::time::Duration;

use kyc_common::KycConfig;

/// Retry configuration with a fixed backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total delivery attempts, including the first.
    pub max_attempts: u32,
    /// Delay before each retry.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Retry settings from the `kyc` config section.
    #[must_use]
    pub fn from_config(config: &KycConfig) -> Self {
        Self {
            max_attempts: config.scan_max_attempts.max(1),
            backoff: Duration::from_secs(config.scan_backoff_secs),
        }
    }

    /// Delay before the attempt following `attempt` (1-indexed).
    #[must_use]
    pub const fn delay_after(&self, _attempt: u32) -> Duration {
        self.backoff
    }

    /// Check if another attempt follows a failed `attempt` (1-indexed).
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
