//! Safety net configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Safety net settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyNetConfig {
    /// Name used in logs and metrics
    pub name: String,
    /// Stop a pass at the first failing blocking check
    pub fail_fast: bool,
    /// Validation summaries retained for `recent_results`
    pub history_limit: usize,
    /// Timeout for each predicate and failure callback
    #[serde(with = "bulwark_kernel::serde_secs::option")]
    pub check_timeout: Option<Duration>,
}

impl Default for SafetyNetConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            fail_fast: true,
            history_limit: 100,
            check_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl SafetyNetConfig {
    /// Create config with a name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set fail-fast
    #[inline]
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set history limit
    #[inline]
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set check timeout
    #[inline]
    #[must_use]
    pub fn with_check_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Describe the first invalid setting, if any
    #[must_use]
    pub fn problem(&self) -> Option<&'static str> {
        if self.name.is_empty() {
            Some("name must not be empty")
        } else if self.history_limit == 0 {
            Some("history_limit must be at least 1")
        } else {
            None
        }
    }
}
