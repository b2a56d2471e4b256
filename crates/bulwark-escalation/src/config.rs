//! Ladder configuration

use crate::level::EscalationLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Escalation ladder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderConfig {
    /// Ladder name, reported in status
    pub name: String,

    /// Level at construction and after `reset`
    pub initial_level: EscalationLevel,

    /// De-escalate one level after a stability period
    pub auto_de_escalate: bool,

    /// Stability period before auto de-escalation
    #[serde(with = "bulwark_kernel::serde_secs")]
    pub de_escalate_after: Duration,

    /// Escalations allowed per rate window
    pub max_escalation_rate: u32,

    /// Trailing window for the rate limit
    #[serde(with = "bulwark_kernel::serde_secs")]
    pub rate_window: Duration,

    /// Install the built-in level actions
    pub register_defaults: bool,

    /// Events retained in history
    pub history_limit: usize,

    /// Timeout applied to action handlers that set none
    #[serde(with = "bulwark_kernel::serde_secs::option")]
    pub action_timeout: Option<Duration>,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            initial_level: EscalationLevel::Normal,
            auto_de_escalate: true,
            de_escalate_after: Duration::from_secs(300),
            max_escalation_rate: 3,
            rate_window: Duration::from_secs(60),
            register_defaults: true,
            history_limit: 1000,
            action_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl LadderConfig {
    /// Create config with a name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set initial level
    #[inline]
    #[must_use]
    pub fn with_initial_level(mut self, level: EscalationLevel) -> Self {
        self.initial_level = level;
        self
    }

    /// Enable or disable auto de-escalation
    #[inline]
    #[must_use]
    pub fn with_auto_de_escalate(mut self, enabled: bool) -> Self {
        self.auto_de_escalate = enabled;
        self
    }

    /// Set stability period
    #[inline]
    #[must_use]
    pub fn with_de_escalate_after(mut self, after: Duration) -> Self {
        self.de_escalate_after = after;
        self
    }

    /// Set escalations allowed per window
    #[inline]
    #[must_use]
    pub fn with_max_escalation_rate(mut self, rate: u32) -> Self {
        self.max_escalation_rate = rate;
        self
    }

    /// Set rate window
    #[inline]
    #[must_use]
    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    /// Install or skip built-in actions
    #[inline]
    #[must_use]
    pub fn with_register_defaults(mut self, enabled: bool) -> Self {
        self.register_defaults = enabled;
        self
    }

    /// Set history retention
    #[inline]
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set default action timeout
    #[inline]
    #[must_use]
    pub fn with_action_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Describe the first invalid setting, if any
    #[must_use]
    pub fn problem(&self) -> Option<&'static str> {
        if self.max_escalation_rate == 0 {
            Some("max_escalation_rate must be at least 1")
        } else if self.rate_window.is_zero() {
            Some("rate_window must be positive")
        } else if self.history_limit == 0 {
            Some("history_limit must be at least 1")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_ladder_policy() {
        let config = LadderConfig::default();
        assert_eq!(config.max_escalation_rate, 3);
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert_eq!(config.de_escalate_after, Duration::from_secs(300));
        assert!(config.problem().is_none());
    }

    #[test]
    fn durations_are_seconds_on_the_wire() {
        let json = serde_json::to_value(LadderConfig::default()).unwrap_or_default();
        assert_eq!(json["de_escalate_after"], serde_json::json!(300.0));

        let parsed: LadderConfig =
            serde_json::from_str(r#"{"name":"prod","rate_window":30}"#).unwrap_or_default();
        assert_eq!(parsed.name, "prod");
        assert_eq!(parsed.rate_window, Duration::from_secs(30));
        assert_eq!(parsed.max_escalation_rate, 3);
    }
}
