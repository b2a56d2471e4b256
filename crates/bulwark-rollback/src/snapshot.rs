//! Snapshot types

use crate::component::ComponentState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ulid::Ulid;

/// Unique snapshot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub Ulid);

impl SnapshotId {
    /// Create new snapshot ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snap-{}", self.0)
    }
}

/// What a snapshot captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Complete state of all components
    #[default]
    Full,
    /// Linked to the previous snapshot via `parent_id`
    Incremental,
    /// Specific components only
    Selective,
    /// Lightweight checkpoint
    Checkpoint,
}

/// Immutable point-in-time capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Identity
    pub id: SnapshotId,
    /// Kind
    pub kind: SnapshotKind,
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Publication sequence number, strictly increasing
    pub sequence: u64,
    /// Component name to captured state
    pub data: BTreeMap<String, ComponentState>,
    /// Free-form metadata
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Previous snapshot for incremental captures
    pub parent_id: Option<SnapshotId>,
}

impl Snapshot {
    /// Component names held by this snapshot
    #[must_use]
    pub fn components(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    /// Listing view
    #[must_use]
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            id: self.id,
            kind: self.kind,
            timestamp: self.timestamp,
            components: self.components(),
            parent_id: self.parent_id,
        }
    }
}

/// Listing view of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Identity
    pub id: SnapshotId,
    /// Kind
    pub kind: SnapshotKind,
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Components held
    pub components: Vec<String>,
    /// Previous snapshot for incremental captures
    pub parent_id: Option<SnapshotId>,
}

/// Parameters for `RollbackSystem::create_snapshot`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotRequest {
    /// Kind of snapshot
    pub kind: SnapshotKind,
    /// Explicit data; when `None`, registered save handlers are used
    pub data: Option<BTreeMap<String, ComponentState>>,
    /// Restrict capture to these components
    pub components: Option<Vec<String>>,
    /// Metadata stored with the snapshot
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SnapshotRequest {
    /// Capture all registered components
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// Capture linked to the latest snapshot
    #[must_use]
    pub fn incremental() -> Self {
        Self::of_kind(SnapshotKind::Incremental)
    }

    /// Capture of a given kind
    #[must_use]
    pub fn of_kind(kind: SnapshotKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Store this data instead of calling save handlers
    #[must_use]
    pub fn with_data(mut self, data: BTreeMap<String, ComponentState>) -> Self {
        self.data = Some(data);
        self
    }

    /// Restrict to these components
    #[must_use]
    pub fn for_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = Some(components.into_iter().map(Into::into).collect());
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
