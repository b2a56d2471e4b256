//! Error taxonomy shared by every control-plane crate
//!
//! Four classes of failure exist:
//! - policy rejection (circuit open, safety check failed, rate limit)
//! - partial failure (some components failed, reported in a result)
//! - configuration error (unknown id, invalid scope)
//! - handler defect (an external hook failed, timed out or panicked)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Failure of an externally supplied handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum HandlerError {
    /// Handler returned an error
    #[error("handler failed: {0}")]
    Failed(String),

    /// Handler exceeded the caller-supplied timeout
    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),

    /// Handler panicked while running
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Create a `Failed` error from any displayable value
    #[inline]
    #[must_use]
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }

    /// Whether the handler ran out of time
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

impl From<String> for HandlerError {
    fn from(value: String) -> Self {
        Self::Failed(value)
    }
}

impl From<&str> for HandlerError {
    fn from(value: &str) -> Self {
        Self::Failed(value.to_string())
    }
}

/// Error classification used by callers to branch on outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Expected rejection; retry later or use a fallback
    PolicyRejection,
    /// Some components failed, the operation as a whole completed
    PartialFailure,
    /// Unknown id, invalid scope or invalid settings
    Configuration,
    /// An external hook, predicate or action failed
    HandlerDefect,
}

/// Classification of an error into the shared taxonomy
pub trait Classify {
    /// The class this error belongs to
    fn class(&self) -> ErrorClass;

    /// Check if the error is an expected policy rejection
    #[inline]
    fn is_policy_rejection(&self) -> bool {
        self.class() == ErrorClass::PolicyRejection
    }

    /// Check if retrying later can succeed without changing configuration
    #[inline]
    fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::PolicyRejection | ErrorClass::PartialFailure
        )
    }
}

impl Classify for HandlerError {
    fn class(&self) -> ErrorClass {
        ErrorClass::HandlerDefect
    }
}

/// Failure of one named component inside a batch operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFailure {
    /// Component name
    pub component: String,
    /// What went wrong
    pub error: HandlerError,
}

impl ComponentFailure {
    /// Create new component failure
    #[inline]
    #[must_use]
    pub fn new(component: impl Into<String>, error: HandlerError) -> Self {
        Self {
            component: component.into(),
            error,
        }
    }
}

impl fmt::Display for ComponentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.component, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_display() {
        let err = HandlerError::failed("disk full");
        assert_eq!(err.to_string(), "handler failed: disk full");
        assert!(!err.is_timeout());
        assert!(HandlerError::TimedOut(Duration::from_secs(1)).is_timeout());
    }

    #[test]
    fn handler_error_is_defect() {
        let err = HandlerError::Panicked("boom".into());
        assert_eq!(err.class(), ErrorClass::HandlerDefect);
        assert!(!err.is_policy_rejection());
        assert!(!err.is_retryable());
    }

    #[test]
    fn component_failure_display() {
        let failure = ComponentFailure::new("db", HandlerError::from("refused"));
        assert_eq!(failure.to_string(), "db: handler failed: refused");
    }
}
