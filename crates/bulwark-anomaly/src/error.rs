//! Error types for anomaly detection

use crate::alert::AlertId;
use bulwark_kernel::{Classify, ErrorClass};

/// Result type for detector operations
pub type Result<T> = std::result::Result<T, DetectorError>;

/// Errors raised by detector configuration and alert bookkeeping
///
/// Recording a sample never fails; bad samples are skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectorError {
    /// Metric configuration rejected
    #[error("invalid config for metric '{name}': {reason}")]
    InvalidMetric {
        /// Metric name
        name: String,
        /// What is wrong
        reason: String,
    },

    /// No stored alert has this id
    #[error("unknown alert: {0}")]
    UnknownAlert(AlertId),
}

impl Classify for DetectorError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Configuration
    }
}
