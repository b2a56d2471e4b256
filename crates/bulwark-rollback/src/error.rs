//! Rollback errors

use crate::snapshot::SnapshotId;
use bulwark_kernel::{Classify, ErrorClass};

/// Rollback system error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollbackError {
    /// Snapshot id not in the store (never created, or evicted)
    #[error("snapshot {0} not found")]
    UnknownSnapshot(SnapshotId),

    /// Component not registered, or not held by the snapshot
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// Selective rollback needs an explicit component list
    #[error("selective rollback requires a component list")]
    MissingComponents,
}

impl Classify for RollbackError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Configuration
    }
}
