//! Health classification reported by every mechanism's stats

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse health of a mechanism, ordered from best to worst
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Operating normally
    #[default]
    Healthy,
    /// Working, but protection has engaged or is probing
    Degraded,
    /// Blocking, stopped, or at high severity
    Critical,
}

impl Health {
    /// Combine two classifications, keeping the worst
    #[inline]
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }

    /// Worst health across an iterator (healthy when empty)
    #[must_use]
    pub fn worst_of<I: IntoIterator<Item = Health>>(iter: I) -> Self {
        iter.into_iter().fold(Health::Healthy, Health::worst)
    }

    /// Check if the mechanism is fully healthy
    #[inline]
    #[must_use]
    pub fn is_healthy(self) -> bool {
        self == Health::Healthy
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Health::Healthy => "healthy",
            Health::Degraded => "degraded",
            Health::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_keeps_most_severe() {
        assert_eq!(Health::Healthy.worst(Health::Degraded), Health::Degraded);
        assert_eq!(Health::Critical.worst(Health::Degraded), Health::Critical);
        assert_eq!(
            Health::worst_of([Health::Healthy, Health::Critical, Health::Degraded]),
            Health::Critical
        );
        assert_eq!(Health::worst_of(Vec::new()), Health::Healthy);
    }

    #[test]
    fn health_serializes_snake_case() {
        assert_eq!(Health::Degraded.to_string(), "degraded");
        assert!(Health::default().is_healthy());
    }
}
