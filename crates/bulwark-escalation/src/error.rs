//! Escalation errors

use crate::event::EventId;
use bulwark_kernel::{Classify, ErrorClass};
use std::time::Duration;

/// Escalation ladder error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EscalationError {
    /// Too many escalations in the trailing window
    #[error("escalation rate limit exceeded ({limit} per {window:?})")]
    RateLimited {
        /// Allowed escalations per window
        limit: u32,
        /// Window length
        window: Duration,
    },

    /// No pending acknowledgment with this id
    #[error("no pending acknowledgment for event {0}")]
    NotPending(EventId),
}

impl EscalationError {
    /// Check if this is the rate limiter
    #[inline]
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl Classify for EscalationError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. } => ErrorClass::PolicyRejection,
            Self::NotPending(_) => ErrorClass::Configuration,
        }
    }
}
