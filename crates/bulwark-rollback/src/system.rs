//! Rollback system
//!
//! Snapshot capture calls save handlers with no lock held and publishes
//! the finished snapshot in one step, so readers never observe a
//! partially captured snapshot. Parents of incremental snapshots are
//! assigned at publication, which keeps the history linear.

use crate::component::{Compensation, ComponentState, RollbackComponent};
use crate::config::RollbackConfig;
use crate::error::RollbackError;
use crate::snapshot::{Snapshot, SnapshotId, SnapshotKind, SnapshotRequest, SnapshotSummary};
use crate::store::SnapshotStore;
use bulwark_kernel::{call_listener, invoke, ComponentFailure, Health};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How a rollback restores state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStrategy {
    /// Restore every component held by the snapshot
    #[default]
    Full,
    /// Replay the chain backwards from the latest snapshot to the target
    Incremental,
    /// Full restore of an explicit subset
    Selective,
    /// Apply a corrective delta instead of overwriting
    Compensating,
}

impl RollbackStrategy {
    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Selective => "selective",
            Self::Compensating => "compensating",
        }
    }
}

/// Outcome of one snapshot capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReceipt {
    /// Published snapshot
    pub id: SnapshotId,
    /// Components captured
    pub components: Vec<String>,
    /// Components whose save handler failed (not stored)
    pub failures: Vec<ComponentFailure>,
    /// Snapshots evicted by this publication
    pub evicted: Vec<SnapshotId>,
}

impl SnapshotReceipt {
    /// Check if every requested component was captured
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of one rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResult {
    /// True iff no component failed
    pub success: bool,
    /// Target snapshot
    pub snapshot_id: SnapshotId,
    /// Strategy used
    pub strategy: RollbackStrategy,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Components that reached the target state
    pub components_restored: Vec<String>,
    /// Components held by the snapshot but not registered
    pub components_skipped: Vec<String>,
    /// Per-component failures
    pub failures: Vec<ComponentFailure>,
    /// Wall time spent
    #[serde(with = "bulwark_kernel::serde_secs")]
    pub duration: Duration,
}

/// Rollback statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackStats {
    /// Registered components
    pub components: usize,
    /// Snapshots currently retained
    pub snapshots_retained: usize,
    /// Snapshots created since construction
    pub snapshots_created: u64,
    /// Snapshots evicted since construction
    pub evictions: u64,
    /// Rollbacks performed
    pub rollbacks_performed: u64,
    /// Rollbacks with at least one failure
    pub rollbacks_failed: u64,
    /// Most recent rollback
    pub last_rollback: Option<RollbackResult>,
    /// Health classification
    pub health: Health,
}

type Listener = Arc<dyn Fn(&RollbackResult) + Send + Sync>;

#[derive(Debug)]
struct Inner {
    store: SnapshotStore,
    sequence: u64,
    // Last state known per component, from captures and restores
    last_known: HashMap<String, ComponentState>,
    snapshots_created: u64,
    evictions: u64,
    rollbacks_performed: u64,
    rollbacks_failed: u64,
    last_rollback: Option<RollbackResult>,
}

#[derive(Default)]
struct Progress {
    restored: Vec<String>,
    skipped: Vec<String>,
    failures: Vec<ComponentFailure>,
}

/// Snapshot/restore engine
pub struct RollbackSystem {
    config: RollbackConfig,
    components: RwLock<BTreeMap<String, Arc<RollbackComponent>>>,
    inner: Mutex<Inner>,
    listeners: RwLock<Vec<Listener>>,
}

impl fmt::Debug for RollbackSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackSystem")
            .field("config", &self.config)
            .field("components", &self.component_names())
            .finish_non_exhaustive()
    }
}

impl Default for RollbackSystem {
    fn default() -> Self {
        Self::new(RollbackConfig::default())
    }
}

impl RollbackSystem {
    /// Create an empty system
    #[must_use]
    pub fn new(config: RollbackConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store: SnapshotStore::new(config.max_snapshots),
                sequence: 0,
                last_known: HashMap::new(),
                snapshots_created: 0,
                evictions: 0,
                rollbacks_performed: 0,
                rollbacks_failed: 0,
                last_rollback: None,
            }),
            components: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Register a component, replacing one with the same name
    pub fn register_component(&self, component: RollbackComponent) {
        tracing::debug!(component = %component.name, "registered rollback component");
        self.components
            .write()
            .insert(component.name.clone(), Arc::new(component));
    }

    /// Remove a component
    pub fn unregister_component(&self, name: &str) -> bool {
        self.components.write().remove(name).is_some()
    }

    /// Registered component names, sorted
    #[must_use]
    pub fn component_names(&self) -> Vec<String> {
        self.components.read().keys().cloned().collect()
    }

    /// Register a listener for rollback results
    pub fn on_rollback<L>(&self, listener: L)
    where
        L: Fn(&RollbackResult) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Capture and publish a snapshot
    ///
    /// # Errors
    /// `RollbackError::UnknownComponent` if the request names a component
    /// that is not registered (when capturing through save handlers).
    pub async fn create_snapshot(&self, request: SnapshotRequest) -> Result<SnapshotReceipt, RollbackError> {
        let SnapshotRequest {
            kind,
            data,
            components,
            metadata,
        } = request;

        let mut failures = Vec::new();
        let data = match data {
            Some(mut data) => {
                if let Some(wanted) = components {
                    let wanted: BTreeSet<String> = wanted.into_iter().collect();
                    data.retain(|name, _| wanted.contains(name));
                }
                data
            }
            None => {
                let targets = self.resolve_components(components)?;
                let mut data = BTreeMap::new();
                for component in targets {
                    let timeout = component.timeout.or(self.config.handler_timeout);
                    match invoke(component.save.as_ref(), (), timeout).await {
                        Ok(state) => {
                            data.insert(component.name.clone(), state);
                        }
                        Err(err) => {
                            tracing::warn!(component = %component.name, error = %err, "snapshot save failed");
                            failures.push(ComponentFailure::new(component.name.clone(), err));
                        }
                    }
                }
                data
            }
        };

        let (id, evicted, total) = {
            let mut inner = self.inner.lock();
            let parent_id = match kind {
                SnapshotKind::Incremental => inner.store.latest().map(|s| s.id),
                _ => None,
            };
            inner.sequence += 1;
            let snapshot = Snapshot {
                id: SnapshotId::new(),
                kind,
                timestamp: Utc::now(),
                sequence: inner.sequence,
                data: data.clone(),
                metadata,
                parent_id,
            };
            let id = snapshot.id;
            for (name, state) in &data {
                inner.last_known.insert(name.clone(), state.clone());
            }
            let evicted = inner.store.push(snapshot);
            inner.snapshots_created += 1;
            inner.evictions += evicted.len() as u64;
            (id, evicted, inner.store.len())
        };

        metrics::gauge!("bulwark_rollback_snapshots").set(total as f64);
        for old in &evicted {
            tracing::debug!(snapshot = %old, "evicted snapshot");
        }
        tracing::info!(
            snapshot = %id,
            kind = ?kind,
            components = data.len(),
            failures = failures.len(),
            "snapshot created"
        );

        Ok(SnapshotReceipt {
            id,
            components: data.into_keys().collect(),
            failures,
            evicted,
        })
    }

    /// Restore state from a snapshot
    ///
    /// `components` restricts the rollback to a subset of the snapshot;
    /// `Selective` requires it.
    ///
    /// # Errors
    /// - `RollbackError::UnknownSnapshot` if the snapshot is not retained
    /// - `RollbackError::UnknownComponent` if a requested component is not
    ///   held by the snapshot
    /// - `RollbackError::MissingComponents` for `Selective` without a list
    pub async fn rollback(
        &self,
        snapshot_id: SnapshotId,
        strategy: RollbackStrategy,
        components: Option<&[String]>,
    ) -> Result<RollbackResult, RollbackError> {
        let started = Instant::now();
        if strategy == RollbackStrategy::Selective && components.is_none() {
            return Err(RollbackError::MissingComponents);
        }

        let chain = self
            .inner
            .lock()
            .store
            .chain_from(&snapshot_id)
            .ok_or(RollbackError::UnknownSnapshot(snapshot_id))?;
        let Some(target) = chain.first().cloned() else {
            return Err(RollbackError::UnknownSnapshot(snapshot_id));
        };

        let selected: Vec<String> = match components {
            Some(requested) => {
                if let Some(missing) = requested.iter().find(|c| !target.data.contains_key(*c)) {
                    return Err(RollbackError::UnknownComponent(missing.clone()));
                }
                let unique: BTreeSet<&String> = requested.iter().collect();
                unique.into_iter().cloned().collect()
            }
            None => target.components(),
        };

        let progress = match strategy {
            RollbackStrategy::Full | RollbackStrategy::Selective => {
                self.restore_all(&target, &selected).await
            }
            RollbackStrategy::Incremental => self.replay_backwards(&chain, &selected).await,
            RollbackStrategy::Compensating => self.compensate_all(&target, &selected).await,
        };

        let result = RollbackResult {
            success: progress.failures.is_empty(),
            snapshot_id,
            strategy,
            timestamp: Utc::now(),
            components_restored: progress.restored,
            components_skipped: progress.skipped,
            failures: progress.failures,
            duration: started.elapsed(),
        };
        self.record(&result, &target);
        Ok(result)
    }

    /// Snapshot by id
    #[must_use]
    pub fn get_snapshot(&self, id: SnapshotId) -> Option<Arc<Snapshot>> {
        self.inner.lock().store.get(&id)
    }

    /// Retained snapshots, oldest first
    #[must_use]
    pub fn list_snapshots(&self) -> Vec<SnapshotSummary> {
        self.inner.lock().store.iter().map(|s| s.summary()).collect()
    }

    /// Most recent snapshot
    #[must_use]
    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.lock().store.latest()
    }

    /// Drop every retained snapshot
    pub fn clear_history(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.store.len();
        inner.store.clear();
        drop(inner);
        metrics::gauge!("bulwark_rollback_snapshots").set(0.0);
        tracing::info!(dropped, "snapshot history cleared");
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> RollbackStats {
        let components = self.components.read().len();
        let inner = self.inner.lock();
        let health = match &inner.last_rollback {
            Some(last) if !last.success => Health::Degraded,
            _ => Health::Healthy,
        };
        RollbackStats {
            components,
            snapshots_retained: inner.store.len(),
            snapshots_created: inner.snapshots_created,
            evictions: inner.evictions,
            rollbacks_performed: inner.rollbacks_performed,
            rollbacks_failed: inner.rollbacks_failed,
            last_rollback: inner.last_rollback.clone(),
            health,
        }
    }

    fn resolve_components(
        &self,
        requested: Option<Vec<String>>,
    ) -> Result<Vec<Arc<RollbackComponent>>, RollbackError> {
        let registry = self.components.read();
        match requested {
            None => Ok(registry.values().cloned().collect()),
            Some(names) => names
                .iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(|name| {
                    registry
                        .get(name)
                        .cloned()
                        .ok_or_else(|| RollbackError::UnknownComponent(name.clone()))
                })
                .collect(),
        }
    }

    fn component(&self, name: &str) -> Option<Arc<RollbackComponent>> {
        self.components.read().get(name).cloned()
    }

    async fn restore_one(
        &self,
        component: &RollbackComponent,
        state: ComponentState,
    ) -> Result<(), ComponentFailure> {
        let timeout = component.timeout.or(self.config.handler_timeout);
        invoke(component.restore.as_ref(), state, timeout)
            .await
            .map_err(|err| {
                tracing::warn!(component = %component.name, error = %err, "restore failed");
                ComponentFailure::new(component.name.clone(), err)
            })
    }

    async fn restore_all(&self, target: &Snapshot, selected: &[String]) -> Progress {
        let mut progress = Progress::default();
        for name in selected {
            let (Some(component), Some(state)) = (self.component(name), target.data.get(name)) else {
                progress.skipped.push(name.clone());
                continue;
            };
            match self.restore_one(&component, state.clone()).await {
                Ok(()) => progress.restored.push(name.clone()),
                Err(failure) => progress.failures.push(failure),
            }
        }
        progress
    }

    // chain[0] is the target; each step restores the previous snapshot's
    // state, so the final step leaves every component at the target state
    async fn replay_backwards(&self, chain: &[Arc<Snapshot>], selected: &[String]) -> Progress {
        let Some(target) = chain.first() else {
            return Progress::default();
        };
        if chain.len() == 1 {
            return self.restore_all(target, selected).await;
        }

        let mut progress = Progress::default();
        let mut components = Vec::new();
        for name in selected {
            match self.component(name) {
                Some(component) => components.push(component),
                None => progress.skipped.push(name.clone()),
            }
        }

        // Latest failure per component; the final step overrides earlier ones
        let mut failed: BTreeMap<String, ComponentFailure> = BTreeMap::new();
        for step in (1..chain.len()).rev() {
            let previous = &chain[step - 1];
            let last_step = step == 1;
            for component in &components {
                let Some(state) = previous.data.get(&component.name) else {
                    continue;
                };
                tracing::debug!(
                    component = %component.name,
                    from = %chain[step].id,
                    to = %previous.id,
                    "replaying snapshot backwards"
                );
                match self.restore_one(component, state.clone()).await {
                    Ok(()) if last_step => {
                        failed.remove(&component.name);
                        progress.restored.push(component.name.clone());
                    }
                    Ok(()) => {}
                    Err(failure) => {
                        failed.insert(component.name.clone(), failure);
                    }
                }
            }
        }
        progress.failures.extend(failed.into_values());
        progress
    }

    async fn compensate_all(&self, target: &Snapshot, selected: &[String]) -> Progress {
        let mut progress = Progress::default();
        for name in selected {
            let (Some(component), Some(state)) = (self.component(name), target.data.get(name)) else {
                progress.skipped.push(name.clone());
                continue;
            };
            let Some(compensate) = component.compensate.clone() else {
                match self.restore_one(&component, state.clone()).await {
                    Ok(()) => progress.restored.push(name.clone()),
                    Err(failure) => progress.failures.push(failure),
                }
                continue;
            };

            let timeout = component.timeout.or(self.config.handler_timeout);
            let current = match invoke(component.save.as_ref(), (), timeout).await {
                Ok(current) => current,
                Err(err) => {
                    tracing::debug!(component = %name, error = %err, "using last known state for compensation");
                    let last_known = self.inner.lock().last_known.get(name).cloned();
                    last_known.unwrap_or(ComponentState::Null)
                }
            };
            let delta = Compensation {
                current,
                target: state.clone(),
            };
            match invoke(compensate.as_ref(), delta, timeout).await {
                Ok(()) => progress.restored.push(name.clone()),
                Err(err) => {
                    tracing::warn!(component = %name, error = %err, "compensation failed");
                    progress.failures.push(ComponentFailure::new(name.clone(), err));
                }
            }
        }
        progress
    }

    fn record(&self, result: &RollbackResult, target: &Snapshot) {
        {
            let mut inner = self.inner.lock();
            for name in &result.components_restored {
                if let Some(state) = target.data.get(name) {
                    inner.last_known.insert(name.clone(), state.clone());
                }
            }
            inner.rollbacks_performed += 1;
            if !result.success {
                inner.rollbacks_failed += 1;
            }
            inner.last_rollback = Some(result.clone());
        }

        let outcome = if result.success { "success" } else { "partial" };
        metrics::counter!(
            "bulwark_rollback_total",
            "strategy" => result.strategy.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        if result.success {
            tracing::info!(
                snapshot = %result.snapshot_id,
                strategy = result.strategy.as_str(),
                restored = result.components_restored.len(),
                "rollback completed"
            );
        } else {
            tracing::warn!(
                snapshot = %result.snapshot_id,
                strategy = result.strategy.as_str(),
                restored = result.components_restored.len(),
                failed = result.failures.len(),
                "rollback completed with failures"
            );
        }

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            call_listener("rollback", || listener(result));
        }
    }
}
