//! Bulwark Rollback - capture and restore component state
//!
//! Components register save/restore (and optionally compensate)
//! handlers. The [`RollbackSystem`] captures their state into
//! immutable [`Snapshot`]s kept in a bounded, publication-ordered
//! [`SnapshotStore`], and restores it with one of four strategies:
//! - `Full`: restore every component in the snapshot
//! - `Incremental`: replay the chain backwards from the latest snapshot
//! - `Selective`: full restore of an explicit component subset
//! - `Compensating`: apply a corrective delta from current to target

pub mod component;
pub mod config;
pub mod error;
pub mod snapshot;
pub mod store;
pub mod system;

pub use component::{Compensation, ComponentState, RollbackComponent};
pub use config::RollbackConfig;
pub use error::RollbackError;
pub use snapshot::{Snapshot, SnapshotId, SnapshotKind, SnapshotRequest, SnapshotSummary};
pub use store::SnapshotStore;
pub use system::{RollbackResult, RollbackStats, RollbackStrategy, RollbackSystem, SnapshotReceipt};
