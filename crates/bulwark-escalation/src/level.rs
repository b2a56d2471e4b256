//! Escalation levels and the pure ladder transition

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal incident severity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EscalationLevel {
    /// Normal operation
    #[default]
    Normal = 0,
    /// Increased monitoring
    Warning = 1,
    /// Team notified
    Alert = 2,
    /// Immediate action required
    Critical = 3,
    /// Stop all operations
    Emergency = 4,
    /// Full shutdown
    Disaster = 5,
}

impl EscalationLevel {
    /// Every level, lowest first
    pub const ALL: [Self; 6] = [
        Self::Normal,
        Self::Warning,
        Self::Alert,
        Self::Critical,
        Self::Emergency,
        Self::Disaster,
    ];

    /// Lowest level
    pub const MIN: Self = Self::Normal;

    /// Highest level
    pub const MAX: Self = Self::Disaster;

    /// Numeric value 0..=5
    #[inline]
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Level for a numeric value
    #[must_use]
    pub const fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::Warning),
            2 => Some(Self::Alert),
            3 => Some(Self::Critical),
            4 => Some(Self::Emergency),
            5 => Some(Self::Disaster),
            _ => None,
        }
    }

    /// Raise by `steps`, clamped at [`Self::MAX`]
    #[must_use]
    pub const fn step_up(self, steps: u8) -> Self {
        let target = self.value().saturating_add(steps);
        match Self::from_value(target) {
            Some(level) => level,
            None => Self::MAX,
        }
    }

    /// Lower by `steps`, clamped at [`Self::MIN`]
    #[must_use]
    pub const fn step_down(self, steps: u8) -> Self {
        match Self::from_value(self.value().saturating_sub(steps)) {
            Some(level) => level,
            None => Self::MIN,
        }
    }

    /// Stable uppercase name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Alert => "ALERT",
            Self::Critical => "CRITICAL",
            Self::Emergency => "EMERGENCY",
            Self::Disaster => "DISASTER",
        }
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.value())
    }
}

/// Requested movement along the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LadderMove {
    /// Raise by n steps
    Up(u8),
    /// Lower by n steps
    Down(u8),
    /// Jump directly to a level
    Jump(EscalationLevel),
}

/// Level reached from `level` by `movement`
///
/// Steps never leave `[MIN, MAX]`; a move that cannot change the level
/// returns `level` unchanged.
#[must_use]
pub const fn next_level(level: EscalationLevel, movement: LadderMove) -> EscalationLevel {
    match movement {
        LadderMove::Up(steps) => level.step_up(steps),
        LadderMove::Down(steps) => level.step_down(steps),
        LadderMove::Jump(target) => target,
    }
}
