//! Breaker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds and timeouts for one breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Counted failures within the window that open the breaker
    pub failure_threshold: u32,

    /// Consecutive HALF_OPEN successes that close the breaker
    pub success_threshold: u32,

    /// How long the breaker stays OPEN before allowing a probe
    #[serde(with = "bulwark_kernel::serde_secs")]
    pub open_timeout: Duration,

    /// Sliding window for failure counting while CLOSED
    #[serde(with = "bulwark_kernel::serde_secs")]
    pub monitoring_window: Duration,

    /// Calls at least this long are counted as slow
    #[serde(with = "bulwark_kernel::serde_secs")]
    pub slow_call_threshold: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            monitoring_window: Duration::from_secs(10),
            slow_call_threshold: Duration::from_secs(5),
        }
    }
}

impl BreakerConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    #[inline]
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the HALF_OPEN success threshold
    #[inline]
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the open timeout
    #[inline]
    #[must_use]
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set the failure monitoring window
    #[inline]
    #[must_use]
    pub fn with_monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    /// Set the slow call threshold
    #[inline]
    #[must_use]
    pub fn with_slow_call_threshold(mut self, threshold: Duration) -> Self {
        self.slow_call_threshold = threshold;
        self
    }

    /// Describe the first invalid setting, if any
    #[must_use]
    pub fn problem(&self) -> Option<&'static str> {
        if self.failure_threshold == 0 {
            Some("failure_threshold must be at least 1")
        } else if self.success_threshold == 0 {
            Some("success_threshold must be at least 1")
        } else if self.monitoring_window.is_zero() {
            Some("monitoring_window must be positive")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = BreakerConfig::new()
            .with_failure_threshold(3)
            .with_success_threshold(1)
            .with_open_timeout(Duration::from_secs(5));

        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.success_threshold, 1);
        assert_eq!(config.open_timeout, Duration::from_secs(5));
        assert!(config.problem().is_none());
    }

    #[test]
    fn zero_threshold_is_a_problem() {
        let config = BreakerConfig::new().with_failure_threshold(0);
        assert!(config.problem().is_some());
    }
}
