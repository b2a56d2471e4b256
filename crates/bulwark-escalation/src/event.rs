//! Escalation event records

use crate::level::EscalationLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique, time-ordered event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub Ulid);

impl EventId {
    /// Create new event ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "esc-{}", self.0)
    }
}

/// One accepted level transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEvent {
    /// Event identity
    pub id: EventId,
    /// When the transition was accepted
    pub timestamp: DateTime<Utc>,
    /// Level before
    pub from_level: EscalationLevel,
    /// Level after
    pub to_level: EscalationLevel,
    /// Why
    pub reason: String,
    /// Who or what requested it
    pub triggered_by: String,
    /// Whether an operator acknowledged it
    pub acknowledged: bool,
    /// Who acknowledged
    pub acknowledged_by: Option<String>,
    /// When it was acknowledged
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl EscalationEvent {
    pub(crate) fn new(
        from_level: EscalationLevel,
        to_level: EscalationLevel,
        reason: impl Into<String>,
        triggered_by: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            from_level,
            to_level,
            reason: reason.into(),
            triggered_by: triggered_by.into(),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }

    /// Check if this event raised the level
    #[inline]
    #[must_use]
    pub fn is_escalation(&self) -> bool {
        self.to_level > self.from_level
    }

    pub(crate) fn acknowledge(&mut self, by: &str, at: DateTime<Utc>) {
        self.acknowledged = true;
        self.acknowledged_by = Some(by.to_string());
        self.acknowledged_at = Some(at);
    }
}
