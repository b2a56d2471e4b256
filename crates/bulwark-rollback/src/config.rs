//! Rollback configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rollback system settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    /// Snapshots retained before the oldest is evicted
    pub max_snapshots: usize,

    /// Timeout for handlers of components that set none
    #[serde(with = "bulwark_kernel::serde_secs::option")]
    pub handler_timeout: Option<Duration>,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            max_snapshots: 100,
            handler_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl RollbackConfig {
    /// Set retention cap
    #[inline]
    #[must_use]
    pub fn with_max_snapshots(mut self, max: usize) -> Self {
        self.max_snapshots = max;
        self
    }

    /// Set default handler timeout
    #[inline]
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Describe the first invalid setting, if any
    #[must_use]
    pub fn problem(&self) -> Option<&'static str> {
        (self.max_snapshots == 0).then_some("max_snapshots must be at least 1")
    }
}
