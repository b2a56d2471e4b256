//! How the plane answers anomaly alerts

use bulwark_anomaly::Severity;
use bulwark_escalation::EscalationLevel;
use bulwark_rollback::RollbackStrategy;
use serde::{Deserialize, Serialize};

/// Metadata key naming the dependency an alert is about
pub const DEPENDENCY_KEY: &str = "dependency";

/// Mapping from alert severity to escalation, breaker and stop responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsePolicy {
    /// Answer alerts automatically
    pub enabled: bool,

    /// Levels to escalate on a MEDIUM alert
    pub medium_steps: u8,

    /// Levels to escalate on a HIGH alert
    pub high_steps: u8,

    /// Levels to escalate on a CRITICAL alert
    pub critical_steps: u8,

    /// Trip the breaker named by a CRITICAL alert's `dependency` metadata
    pub trip_on_critical_dependency: bool,

    /// Ladder level at which the whole system is stopped
    pub stop_level: EscalationLevel,

    /// Capture a FULL snapshot before the stop and restore it on recovery
    pub auto_rollback: bool,

    /// Strategy used for the recovery restore
    pub rollback_strategy: RollbackStrategy,
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            medium_steps: 0,
            high_steps: 1,
            critical_steps: 2,
            trip_on_critical_dependency: true,
            stop_level: EscalationLevel::Emergency,
            auto_rollback: true,
            rollback_strategy: RollbackStrategy::Full,
        }
    }
}

impl ResponsePolicy {
    /// Escalation steps for an alert of `severity`
    #[must_use]
    pub fn steps_for(&self, severity: Severity) -> u8 {
        match severity {
            Severity::Low => 0,
            Severity::Medium => self.medium_steps,
            Severity::High => self.high_steps,
            Severity::Critical => self.critical_steps,
        }
    }

    /// Check if the ladder has reached the stop level
    #[inline]
    #[must_use]
    pub fn requires_stop(&self, level: EscalationLevel) -> bool {
        level >= self.stop_level
    }

    /// Disable automatic responses
    #[inline]
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Set steps for HIGH and CRITICAL alerts
    #[inline]
    #[must_use]
    pub fn with_steps(mut self, high: u8, critical: u8) -> Self {
        self.high_steps = high;
        self.critical_steps = critical;
        self
    }

    /// Set the stop level
    #[inline]
    #[must_use]
    pub fn with_stop_level(mut self, level: EscalationLevel) -> Self {
        self.stop_level = level;
        self
    }

    /// Enable or disable the pre-stop snapshot
    #[inline]
    #[must_use]
    pub fn with_auto_rollback(mut self, enabled: bool) -> Self {
        self.auto_rollback = enabled;
        self
    }

    /// Describe the first invalid setting, if any
    #[must_use]
    pub fn problem(&self) -> Option<&'static str> {
        if self.critical_steps == 0 {
            Some("critical_steps must be at least 1")
        } else if self.stop_level == EscalationLevel::MIN {
            Some("stop_level must be above normal")
        } else if self.rollback_strategy == RollbackStrategy::Selective {
            Some("rollback_strategy cannot be selective")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_severity_to_steps() {
        let policy = ResponsePolicy::default();
        assert_eq!(policy.steps_for(Severity::Low), 0);
        assert_eq!(policy.steps_for(Severity::Medium), 0);
        assert_eq!(policy.steps_for(Severity::High), 1);
        assert_eq!(policy.steps_for(Severity::Critical), 2);
        assert!(policy.problem().is_none());
    }

    #[test]
    fn stop_level_is_inclusive() {
        let policy = ResponsePolicy::default();
        assert!(!policy.requires_stop(EscalationLevel::Critical));
        assert!(policy.requires_stop(EscalationLevel::Emergency));
        assert!(policy.requires_stop(EscalationLevel::Disaster));
    }

    #[test]
    fn rejects_normal_stop_level() {
        let policy = ResponsePolicy::default().with_stop_level(EscalationLevel::Normal);
        assert_eq!(policy.problem(), Some("stop_level must be above normal"));

        let policy = ResponsePolicy::default().with_steps(1, 0);
        assert_eq!(policy.problem(), Some("critical_steps must be at least 1"));
    }
}
