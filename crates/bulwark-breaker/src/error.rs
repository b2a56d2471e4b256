//! Breaker error type

use bulwark_kernel::{Classify, ErrorClass};

/// Outcome of a guarded call that did not produce a value
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The breaker is OPEN and the call was not dispatched
    #[error("circuit breaker '{name}' is open")]
    Open {
        /// Breaker name
        name: String,
    },

    /// The operation ran and failed
    #[error("operation failed: {0}")]
    Operation(#[source] E),
}

impl<E> BreakerError<E> {
    /// Check if the call was rejected without running
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The operation's own error, if it ran
    #[inline]
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(err) => Some(err),
            Self::Open { .. } => None,
        }
    }
}

impl<E> Classify for BreakerError<E> {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Open { .. } => ErrorClass::PolicyRejection,
            Self::Operation(_) => ErrorClass::HandlerDefect,
        }
    }
}
