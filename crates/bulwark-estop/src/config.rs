//! Emergency stop configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Emergency stop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstopConfig {
    /// Stop results retained in history
    pub history_limit: usize,
    /// Timeout for hooks, conditions and component handlers
    #[serde(with = "bulwark_kernel::serde_secs::option")]
    pub handler_timeout: Option<Duration>,
    /// Poll interval of the condition monitor
    #[serde(with = "bulwark_kernel::serde_secs")]
    pub monitor_interval: Duration,
}

impl Default for EstopConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            handler_timeout: Some(Duration::from_secs(30)),
            monitor_interval: Duration::from_secs(1),
        }
    }
}

impl EstopConfig {
    /// Set history limit
    #[inline]
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set handler timeout
    #[inline]
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Set monitor interval
    #[inline]
    #[must_use]
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Describe the first invalid setting, if any
    #[must_use]
    pub fn problem(&self) -> Option<&'static str> {
        if self.history_limit == 0 {
            Some("history_limit must be at least 1")
        } else if self.monitor_interval.is_zero() {
            Some("monitor_interval must be positive")
        } else {
            None
        }
    }
}
