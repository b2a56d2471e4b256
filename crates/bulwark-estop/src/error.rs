//! Emergency stop errors

use crate::scope::StopScope;
use bulwark_kernel::{Classify, ErrorClass};

/// Emergency stop error
///
/// Raised before any hook or handler runs; a stop that started always
/// completes and reports failures in its result instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StopError {
    /// Component not registered
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// Scope needs an explicit target list
    #[error("{0} scope requires a target list")]
    MissingTargets(StopScope),

    /// Condition not registered
    #[error("unknown stop condition: {0}")]
    UnknownCondition(String),
}

impl Classify for StopError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Configuration
    }
}
