//! Bounded, publication-ordered snapshot store

use crate::snapshot::{Snapshot, SnapshotId};
use indexmap::IndexMap;
use std::sync::Arc;

/// In-memory snapshot store with oldest-first eviction
#[derive(Debug)]
pub struct SnapshotStore {
    snapshots: IndexMap<SnapshotId, Arc<Snapshot>>,
    capacity: usize,
}

impl SnapshotStore {
    /// Create store retaining at most `capacity` snapshots
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: IndexMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a snapshot, returning the ids evicted to stay within capacity
    pub fn push(&mut self, snapshot: Snapshot) -> Vec<SnapshotId> {
        self.snapshots.insert(snapshot.id, Arc::new(snapshot));
        let mut evicted = Vec::new();
        while self.snapshots.len() > self.capacity {
            match self.snapshots.shift_remove_index(0) {
                Some((id, _)) => evicted.push(id),
                None => break,
            }
        }
        evicted
    }

    /// Snapshot by id
    #[must_use]
    pub fn get(&self, id: &SnapshotId) -> Option<Arc<Snapshot>> {
        self.snapshots.get(id).cloned()
    }

    /// Most recently published snapshot
    #[must_use]
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.snapshots.last().map(|(_, s)| Arc::clone(s))
    }

    /// Snapshots from `id` through the latest, in publication order
    #[must_use]
    pub fn chain_from(&self, id: &SnapshotId) -> Option<Vec<Arc<Snapshot>>> {
        let start = self.snapshots.get_index_of(id)?;
        Some(
            self.snapshots
                .values()
                .skip(start)
                .cloned()
                .collect(),
        )
    }

    /// All snapshots, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Snapshot>> {
        self.snapshots.values()
    }

    /// Drop every snapshot
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Number of retained snapshots
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Retention cap
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
