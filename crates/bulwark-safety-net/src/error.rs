//! Safety net errors

use crate::check::CheckResult;
use bulwark_kernel::{Classify, ErrorClass};

/// Safety net error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafetyError {
    /// A blocking check failed; the operation did not run
    #[error("safety check failed: {}", first_failure(.failures))]
    CheckFailed {
        /// Failing blocking checks, in execution order
        failures: Vec<CheckResult>,
    },

    /// No check has this name
    #[error("unknown safety check: {0}")]
    UnknownCheck(String),
}

fn first_failure(failures: &[CheckResult]) -> &str {
    failures.first().map_or("<none>", |f| f.check.as_str())
}

impl SafetyError {
    /// Check if the operation was blocked by a failing check
    #[inline]
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::CheckFailed { .. })
    }

    /// Failing checks carried by a `CheckFailed` error
    #[must_use]
    pub fn failures(&self) -> &[CheckResult] {
        match self {
            Self::CheckFailed { failures } => failures,
            Self::UnknownCheck(_) => &[],
        }
    }
}

impl Classify for SafetyError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::CheckFailed { .. } => ErrorClass::PolicyRejection,
            Self::UnknownCheck(_) => ErrorClass::Configuration,
        }
    }
}
