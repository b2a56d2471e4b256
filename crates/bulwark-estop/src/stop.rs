//! Emergency stop
//!
//! `trigger` and `recover` are serialized by an async sequence lock so a
//! stop never interleaves with a recovery. Bookkeeping sits behind a
//! short-lived mutex that is never held across a handler call.

use crate::component::StoppableComponent;
use crate::condition::StopCondition;
use crate::config::EstopConfig;
use crate::error::StopError;
use crate::registry::ComponentRegistry;
use crate::scope::{StopReason, StopScope};
use bulwark_kernel::{
    invoke, spawn_periodic, ComponentFailure, Handler, HandlerError, Health, LoopControl,
    LoopHandle, SharedHandler,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What pre-stop and post-stop hooks are told about a stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopNotice {
    /// Why the stop was triggered
    pub reason: StopReason,
    /// Scope of the stop
    pub scope: StopScope,
    /// Who or what triggered it
    pub initiated_by: String,
}

/// Outcome of `trigger`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResult {
    /// No component failed to stop
    pub success: bool,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Why the stop was triggered
    pub reason: StopReason,
    /// Scope of the stop
    pub scope: StopScope,
    /// Who or what triggered it
    pub initiated_by: String,
    /// Components stopped by this call
    pub components_stopped: Vec<String>,
    /// Selected components that were already stopped
    pub already_stopped: Vec<String>,
    /// Components whose stop handler failed
    pub errors: Vec<ComponentFailure>,
    /// Hooks that failed
    pub warnings: Vec<ComponentFailure>,
    /// Wall time of the whole sequence
    #[serde(with = "bulwark_kernel::serde_secs")]
    pub duration: Duration,
}

/// Outcome of `recover`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryResult {
    /// Every requested component recovered
    pub success: bool,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Components recovered by this call
    pub recovered: Vec<String>,
    /// Components whose recovery failed or that have no recovery handler
    pub failed: Vec<ComponentFailure>,
    /// Requested components that were not stopped
    pub skipped: Vec<String>,
    /// Components still stopped afterwards
    pub still_stopped: Vec<String>,
    /// Recovery hooks that failed
    pub warnings: Vec<ComponentFailure>,
    /// Whether the stop was lifted
    pub resumed: bool,
}

/// Current emergency stop status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopStatus {
    /// Whether a stop is in effect
    pub is_stopped: bool,
    /// Reason of the stop in effect
    pub stop_reason: Option<StopReason>,
    /// Scope of the stop in effect
    pub stop_scope: Option<StopScope>,
    /// When the stop in effect was triggered
    pub stop_time: Option<DateTime<Utc>>,
    /// Who triggered the stop in effect
    pub initiated_by: Option<String>,
    /// Components currently stopped, sorted
    pub stopped_components: Vec<String>,
    /// Registered components
    pub total_components: usize,
    /// Enabled conditions
    pub active_conditions: usize,
    /// Whether the monitor will act on a firing condition
    pub monitoring_armed: bool,
    /// Stops triggered since construction
    pub total_triggers: u64,
    /// Recoveries attempted since construction
    pub total_recoveries: u64,
    /// Health classification
    pub health: Health,
}

type Hook = SharedHandler<StopNotice, ()>;
type RecoveryHook = SharedHandler<(), ()>;

#[derive(Debug, Clone)]
struct ActiveStop {
    reason: StopReason,
    scope: StopScope,
    at: DateTime<Utc>,
    initiated_by: String,
}

#[derive(Debug)]
struct StopState {
    active: Option<ActiveStop>,
    stopped: BTreeSet<String>,
    armed: bool,
    history: VecDeque<StopResult>,
    total_triggers: u64,
    total_recoveries: u64,
}

#[derive(Default)]
struct Hooks {
    pre_stop: Vec<Hook>,
    post_stop: Vec<Hook>,
    recovery: Vec<RecoveryHook>,
}

/// Scoped, condition-triggered kill switch
pub struct EmergencyStop {
    config: EstopConfig,
    components: RwLock<ComponentRegistry>,
    conditions: RwLock<Vec<StopCondition>>,
    hooks: RwLock<Hooks>,
    state: Mutex<StopState>,
    sequence: tokio::sync::Mutex<()>,
}

impl fmt::Debug for EmergencyStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmergencyStop")
            .field("is_stopped", &self.is_stopped())
            .field("components", &self.components.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for EmergencyStop {
    fn default() -> Self {
        Self::new(EstopConfig::default())
    }
}

impl EmergencyStop {
    /// Create emergency stop in the running state, monitoring armed
    #[must_use]
    pub fn new(config: EstopConfig) -> Self {
        Self {
            config,
            components: RwLock::new(ComponentRegistry::default()),
            conditions: RwLock::new(Vec::new()),
            hooks: RwLock::new(Hooks::default()),
            state: Mutex::new(StopState {
                active: None,
                stopped: BTreeSet::new(),
                armed: true,
                history: VecDeque::new(),
                total_triggers: 0,
                total_recoveries: 0,
            }),
            sequence: tokio::sync::Mutex::new(()),
        }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EstopConfig {
        &self.config
    }

    /// Register (or replace) a component
    pub fn register_component(&self, component: StoppableComponent) {
        tracing::debug!(
            component = %component.name,
            subsystem = ?component.subsystem,
            service = ?component.service,
            "registered stoppable component"
        );
        self.components.write().insert(component);
    }

    /// Remove a component; it also leaves the stopped set
    pub fn unregister_component(&self, name: &str) -> Option<StoppableComponent> {
        let removed = self.components.write().remove(name);
        if removed.is_some() {
            self.state.lock().stopped.remove(name);
        }
        removed
    }

    /// Registered component names, in registration order
    #[must_use]
    pub fn component_names(&self) -> Vec<String> {
        self.components.read().names()
    }

    /// Add a stop condition
    ///
    /// # Errors
    /// Returns `StopError::MissingTargets` if the condition's scope needs
    /// targets and it has none.
    pub fn add_condition(&self, condition: StopCondition) -> Result<(), StopError> {
        if condition.scope.requires_targets() && condition.targets.is_none() {
            return Err(StopError::MissingTargets(condition.scope));
        }
        tracing::debug!(condition = %condition.name, reason = %condition.reason, "added stop condition");
        let mut conditions = self.conditions.write();
        conditions.retain(|c| c.name != condition.name);
        conditions.push(condition);
        Ok(())
    }

    /// Enable or disable a condition
    ///
    /// # Errors
    /// Returns `StopError::UnknownCondition` if no condition has `name`.
    pub fn set_condition_enabled(&self, name: &str, enabled: bool) -> Result<(), StopError> {
        let mut conditions = self.conditions.write();
        let condition = conditions
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| StopError::UnknownCondition(name.to_string()))?;
        condition.enabled = enabled;
        tracing::info!(condition = %name, enabled, "stop condition toggled");
        Ok(())
    }

    /// Remove a condition
    pub fn remove_condition(&self, name: &str) -> bool {
        let mut conditions = self.conditions.write();
        let before = conditions.len();
        conditions.retain(|c| c.name != name);
        conditions.len() != before
    }

    /// Registered conditions
    #[must_use]
    pub fn conditions(&self) -> Vec<StopCondition> {
        self.conditions.read().clone()
    }

    /// Add a hook run before components are stopped
    pub fn add_pre_stop_hook<H>(&self, hook: H)
    where
        H: Handler<StopNotice, ()> + 'static,
    {
        self.hooks.write().pre_stop.push(Arc::new(hook));
    }

    /// Add a hook run after components are stopped
    pub fn add_post_stop_hook<H>(&self, hook: H)
    where
        H: Handler<StopNotice, ()> + 'static,
    {
        self.hooks.write().post_stop.push(Arc::new(hook));
    }

    /// Add a hook run before components are recovered
    pub fn add_recovery_hook<H>(&self, hook: H)
    where
        H: Handler<(), ()> + 'static,
    {
        self.hooks.write().recovery.push(Arc::new(hook));
    }

    /// Whether a stop is in effect
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// Reason of the stop in effect
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.state.lock().active.as_ref().map(|a| a.reason)
    }

    /// Scope of the stop in effect
    #[must_use]
    pub fn stop_scope(&self) -> Option<StopScope> {
        self.state.lock().active.as_ref().map(|a| a.scope)
    }

    /// Components currently stopped, sorted
    #[must_use]
    pub fn stopped_components(&self) -> Vec<String> {
        self.state.lock().stopped.iter().cloned().collect()
    }

    /// Stop the components selected by `scope` and `targets`
    ///
    /// `targets` names components for `Component`, subsystems for
    /// `Subsystem` and services for `Service`; broader scopes ignore it.
    ///
    /// # Errors
    /// Returns `StopError` before anything runs if the selection is
    /// invalid. Handler failures are reported in the result instead.
    pub async fn trigger(
        &self,
        reason: StopReason,
        scope: StopScope,
        initiated_by: &str,
        targets: Option<&[String]>,
    ) -> Result<StopResult, StopError> {
        let _sequence = self.sequence.lock().await;
        let started = tokio::time::Instant::now();
        let selected = self.components.read().select(scope, targets)?;

        // The stop is in effect before any handler runs, so a cancelled
        // sequence never leaves stopped components behind a running flag.
        {
            let mut state = self.state.lock();
            state.active = Some(ActiveStop {
                reason,
                scope,
                at: Utc::now(),
                initiated_by: initiated_by.to_string(),
            });
            state.total_triggers += 1;
        }
        metrics::gauge!("bulwark_estop_stopped").set(1.0);

        tracing::error!(
            reason = %reason,
            scope = %scope,
            initiated_by,
            components = selected.len(),
            "emergency stop triggered"
        );

        let notice = StopNotice {
            reason,
            scope,
            initiated_by: initiated_by.to_string(),
        };
        let (pre_stop, post_stop) = {
            let hooks = self.hooks.read();
            (hooks.pre_stop.clone(), hooks.post_stop.clone())
        };

        let mut warnings = self.run_hooks("pre_stop", &pre_stop, &notice).await;

        let mut components_stopped = Vec::new();
        let mut already_stopped = Vec::new();
        let mut errors = Vec::new();
        for component in selected {
            if self.state.lock().stopped.contains(&component.name) {
                already_stopped.push(component.name);
                continue;
            }
            let timeout = component.timeout.or(self.config.handler_timeout);
            match invoke(component.stop.as_ref(), (), timeout).await {
                Ok(()) => {
                    self.state.lock().stopped.insert(component.name.clone());
                    components_stopped.push(component.name);
                }
                Err(e) => {
                    tracing::warn!(component = %component.name, error = %e, "component failed to stop");
                    errors.push(ComponentFailure::new(component.name, e));
                }
            }
        }

        warnings.extend(self.run_hooks("post_stop", &post_stop, &notice).await);

        let result = StopResult {
            success: errors.is_empty(),
            timestamp: Utc::now(),
            reason,
            scope,
            initiated_by: initiated_by.to_string(),
            components_stopped,
            already_stopped,
            errors,
            warnings,
            duration: started.elapsed(),
        };

        {
            let mut state = self.state.lock();
            state.history.push_back(result.clone());
            while state.history.len() > self.config.history_limit {
                state.history.pop_front();
            }
        }
        metrics::counter!(
            "bulwark_estop_triggers_total",
            "reason" => reason.as_str(),
            "scope" => scope.as_str()
        )
        .increment(1);

        tracing::info!(
            stopped = result.components_stopped.len(),
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            success = result.success,
            "emergency stop completed"
        );
        Ok(result)
    }

    /// Recover stopped components (all of them when `components` is `None`)
    ///
    /// A component leaves the stopped set only when its recovery handler
    /// succeeds. The stop is lifted once the stopped set is empty.
    ///
    /// # Errors
    /// Returns `StopError::UnknownComponent` if a requested component is
    /// not registered.
    pub async fn recover(&self, components: Option<&[String]>) -> Result<RecoveryResult, StopError> {
        let _sequence = self.sequence.lock().await;

        let stopped_now: Vec<String> = self.state.lock().stopped.iter().cloned().collect();
        let (targets, skipped) = {
            let registry = self.components.read();
            match components {
                None => (registry.resolve(&stopped_now), Vec::new()),
                Some(names) => {
                    if let Some(unknown) = names.iter().find(|n| !registry.contains(n)) {
                        return Err(StopError::UnknownComponent(unknown.clone()));
                    }
                    let (wanted, skipped): (Vec<String>, Vec<String>) = names
                        .iter()
                        .cloned()
                        .partition(|n| stopped_now.contains(n));
                    (registry.resolve(&wanted), skipped)
                }
            }
        };

        tracing::info!(components = targets.len(), "emergency stop recovery started");

        let recovery_hooks = self.hooks.read().recovery.clone();
        let mut warnings = Vec::new();
        for (index, hook) in recovery_hooks.iter().enumerate() {
            if let Err(e) = invoke(hook.as_ref(), (), self.config.handler_timeout).await {
                tracing::warn!(hook = index, error = %e, "recovery hook failed");
                warnings.push(ComponentFailure::new(format!("recovery_hook[{index}]"), e));
            }
        }

        let mut recovered = Vec::new();
        let mut failed = Vec::new();
        for component in targets {
            let Some(handler) = component.recover.as_ref() else {
                failed.push(ComponentFailure::new(
                    component.name,
                    HandlerError::failed("no recovery handler"),
                ));
                continue;
            };
            let timeout = component.timeout.or(self.config.handler_timeout);
            match invoke(handler.as_ref(), (), timeout).await {
                Ok(()) => {
                    self.state.lock().stopped.remove(&component.name);
                    recovered.push(component.name);
                }
                Err(e) => {
                    tracing::warn!(component = %component.name, error = %e, "component failed to recover");
                    failed.push(ComponentFailure::new(component.name, e));
                }
            }
        }

        let (still_stopped, resumed) = {
            let mut state = self.state.lock();
            state.total_recoveries += 1;
            let resumed = state.stopped.is_empty();
            if resumed {
                state.active = None;
                state.armed = true;
            }
            (state.stopped.iter().cloned().collect::<Vec<_>>(), resumed)
        };
        if resumed {
            metrics::gauge!("bulwark_estop_stopped").set(0.0);
        }

        tracing::info!(
            recovered = recovered.len(),
            failed = failed.len(),
            resumed,
            "emergency stop recovery finished"
        );

        Ok(RecoveryResult {
            success: failed.is_empty(),
            timestamp: Utc::now(),
            recovered,
            failed,
            skipped,
            still_stopped,
            warnings,
            resumed,
        })
    }

    async fn run_hooks(
        &self,
        phase: &str,
        hooks: &[Hook],
        notice: &StopNotice,
    ) -> Vec<ComponentFailure> {
        let mut failures = Vec::new();
        for (index, hook) in hooks.iter().enumerate() {
            if let Err(e) = invoke(hook.as_ref(), notice.clone(), self.config.handler_timeout).await {
                tracing::warn!(phase, hook = index, error = %e, "stop hook failed");
                failures.push(ComponentFailure::new(format!("{phase}_hook[{index}]"), e));
            }
        }
        failures
    }

    /// Poll enabled conditions once; trigger on the first that fires
    ///
    /// Does nothing while stopped or after an auto-trigger until
    /// [`reset_monitoring`](Self::reset_monitoring) or a full recovery.
    pub async fn check_conditions(&self) -> Option<StopResult> {
        {
            let state = self.state.lock();
            if state.active.is_some() || !state.armed {
                return None;
            }
        }

        let conditions: Vec<StopCondition> = self
            .conditions
            .read()
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect();

        for condition in conditions {
            match invoke(condition.check.as_ref(), (), self.config.handler_timeout).await {
                Ok(false) => {}
                Ok(true) => {
                    self.state.lock().armed = false;
                    let actor = format!("condition:{}", condition.name);
                    tracing::warn!(condition = %condition.name, "stop condition fired");
                    return match self
                        .trigger(condition.reason, condition.scope, &actor, condition.targets.as_deref())
                        .await
                    {
                        Ok(result) => Some(result),
                        Err(e) => {
                            tracing::error!(condition = %condition.name, error = %e, "condition stop rejected");
                            None
                        }
                    };
                }
                Err(e) => {
                    tracing::warn!(condition = %condition.name, error = %e, "stop condition check failed");
                }
            }
        }
        None
    }

    /// Re-arm the monitor after an auto-trigger
    pub fn reset_monitoring(&self) {
        self.state.lock().armed = true;
        tracing::info!("stop condition monitoring re-armed");
    }

    /// Poll conditions every configured interval until the handle is stopped
    pub fn start_monitoring(self: &Arc<Self>) -> LoopHandle {
        let estop = Arc::clone(self);
        spawn_periodic("estop-monitor", self.config.monitor_interval, move || {
            let estop = Arc::clone(&estop);
            async move {
                estop.check_conditions().await;
                LoopControl::Continue
            }
        })
    }

    /// Most recent `limit` stop results, oldest first
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<StopResult> {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> StopStatus {
        let total_components = self.components.read().len();
        let active_conditions = self.conditions.read().iter().filter(|c| c.enabled).count();
        let state = self.state.lock();
        StopStatus {
            is_stopped: state.active.is_some(),
            stop_reason: state.active.as_ref().map(|a| a.reason),
            stop_scope: state.active.as_ref().map(|a| a.scope),
            stop_time: state.active.as_ref().map(|a| a.at),
            initiated_by: state.active.as_ref().map(|a| a.initiated_by.clone()),
            stopped_components: state.stopped.iter().cloned().collect(),
            total_components,
            active_conditions,
            monitoring_armed: state.armed,
            total_triggers: state.total_triggers,
            total_recoveries: state.total_recoveries,
            health: if state.active.is_some() {
                Health::Critical
            } else {
                Health::Healthy
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_kernel::{sync_handler, HandlerResult};
    use bulwark_test_utils::CallCounter;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn component(name: &str, stops: &CallCounter, recovers: &CallCounter) -> StoppableComponent {
        StoppableComponent::new(name, stops.handler::<()>()).with_recovery(recovers.handler::<()>())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn hooks_wrap_component_stops() {
        let estop = EmergencyStop::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&order);
        estop.add_pre_stop_hook(sync_handler(move |notice: StopNotice| {
            log.lock().push(format!("pre:{}", notice.reason));
            Ok(())
        }));
        let log = Arc::clone(&order);
        estop.register_component(StoppableComponent::new(
            "api",
            sync_handler(move |(): ()| {
                log.lock().push("stop:api".to_string());
                Ok(())
            }),
        ));
        let log = Arc::clone(&order);
        estop.add_post_stop_hook(sync_handler(move |notice: StopNotice| {
            log.lock().push(format!("post:{}", notice.initiated_by));
            Ok(())
        }));

        let result = estop
            .trigger(StopReason::Manual, StopScope::System, "operator", None)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.components_stopped, names(&["api"]));
        assert_eq!(
            *order.lock(),
            vec!["pre:manual".to_string(), "stop:api".to_string(), "post:operator".to_string()]
        );
        assert!(estop.is_stopped());
        assert_eq!(estop.stop_reason(), Some(StopReason::Manual));
        assert_eq!(estop.stop_scope(), Some(StopScope::System));
    }

    #[tokio::test]
    async fn stop_failures_do_not_abort_the_batch() {
        let estop = EmergencyStop::default();
        let ok = CallCounter::new();
        let broken = CallCounter::failing();
        estop.register_component(StoppableComponent::new("a", broken.handler::<()>()));
        estop.register_component(StoppableComponent::new("b", ok.handler::<()>()));
        estop.add_pre_stop_hook(sync_handler(|_notice: StopNotice| -> HandlerResult<()> {
            panic!("hook bug")
        }));

        let result = estop
            .trigger(StopReason::CascadingFailure, StopScope::Global, "monitor", None)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.components_stopped, names(&["b"]));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].component, "a");
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].component, "pre_stop_hook[0]");
        assert!(estop.is_stopped());
        assert_eq!(estop.stopped_components(), names(&["b"]));
    }

    #[tokio::test]
    async fn hook_failures_alone_keep_success() {
        let estop = EmergencyStop::default();
        estop.register_component(StoppableComponent::new("a", CallCounter::new().handler::<()>()));
        estop.add_post_stop_hook(CallCounter::failing().handler::<StopNotice>());

        let result = estop
            .trigger(StopReason::Manual, StopScope::System, "operator", None)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn stopped_components_are_not_stopped_twice() {
        let estop = EmergencyStop::default();
        let stops = CallCounter::new();
        let recovers = CallCounter::new();
        estop.register_component(component("a", &stops, &recovers));
        estop.register_component(component("b", &stops, &recovers));

        estop
            .trigger(StopReason::Manual, StopScope::Component, "op", Some(&names(&["a"])))
            .await
            .unwrap();
        let second = estop
            .trigger(StopReason::Manual, StopScope::System, "op", None)
            .await
            .unwrap();

        assert_eq!(second.components_stopped, names(&["b"]));
        assert_eq!(second.already_stopped, names(&["a"]));
        assert_eq!(stops.count(), 2);
    }

    #[tokio::test]
    async fn invalid_selection_runs_nothing() {
        let estop = EmergencyStop::default();
        let hook = CallCounter::new();
        estop.add_pre_stop_hook(hook.handler::<StopNotice>());

        let err = estop
            .trigger(StopReason::Manual, StopScope::Subsystem, "op", None)
            .await
            .unwrap_err();
        assert_eq!(err, StopError::MissingTargets(StopScope::Subsystem));
        assert_eq!(hook.count(), 0);
        assert!(!estop.is_stopped());
    }

    #[tokio::test]
    async fn partial_recovery_keeps_stop_in_effect() {
        let estop = EmergencyStop::default();
        let stops = CallCounter::new();
        let good = CallCounter::new();
        let flaky = CallCounter::failing();
        estop.register_component(component("a", &stops, &good));
        estop.register_component(component("b", &stops, &flaky));
        estop
            .trigger(StopReason::DataCorruption, StopScope::System, "op", None)
            .await
            .unwrap();

        let first = estop.recover(None).await.unwrap();
        assert!(!first.success);
        assert!(!first.resumed);
        assert_eq!(first.recovered, names(&["a"]));
        assert_eq!(first.still_stopped, names(&["b"]));
        assert!(estop.is_stopped());

        flaky.set_failing(false);
        let second = estop.recover(None).await.unwrap();
        assert!(second.success);
        assert!(second.resumed);
        assert!(!estop.is_stopped());
        assert_eq!(estop.stop_reason(), None);
        assert_eq!(estop.status().total_recoveries, 2);
    }

    #[tokio::test]
    async fn component_without_recovery_stays_stopped() {
        let estop = EmergencyStop::default();
        estop.register_component(StoppableComponent::new("oneway", CallCounter::new().handler::<()>()));
        estop
            .trigger(StopReason::Manual, StopScope::System, "op", None)
            .await
            .unwrap();

        let result = estop.recover(None).await.unwrap();
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].error, HandlerError::failed("no recovery handler"));
        assert!(estop.is_stopped());
    }

    #[tokio::test]
    async fn targeted_recovery() {
        let estop = EmergencyStop::default();
        let stops = CallCounter::new();
        let recovers = CallCounter::new();
        for name in ["a", "b", "c"] {
            estop.register_component(component(name, &stops, &recovers));
        }
        estop
            .trigger(StopReason::Manual, StopScope::Component, "op", Some(&names(&["a", "b"])))
            .await
            .unwrap();

        let result = estop.recover(Some(&names(&["a", "c"]))).await.unwrap();
        assert_eq!(result.recovered, names(&["a"]));
        assert_eq!(result.skipped, names(&["c"]));
        assert_eq!(result.still_stopped, names(&["b"]));

        assert_eq!(
            estop.recover(Some(&names(&["ghost"]))).await.unwrap_err(),
            StopError::UnknownComponent("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let estop = EmergencyStop::new(EstopConfig::default().with_history_limit(2));
        for actor in ["one", "two", "three"] {
            estop
                .trigger(StopReason::Manual, StopScope::System, actor, None)
                .await
                .unwrap();
        }
        let actors: Vec<String> = estop.history(10).into_iter().map(|r| r.initiated_by).collect();
        assert_eq!(actors, names(&["two", "three"]));
        assert_eq!(estop.history(1).len(), 1);
        assert_eq!(estop.status().total_triggers, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_trigger_keeps_stop_in_effect() {
        let estop = EmergencyStop::default();
        let stops = CallCounter::new();
        let recovers = CallCounter::new();
        estop.register_component(component("fast", &stops, &recovers));
        estop.register_component(
            StoppableComponent::new("slow", |(): ()| async {
                tokio::time::sleep(Duration::from_secs(15)).await;
                Ok::<(), HandlerError>(())
            })
            .with_recovery(recovers.handler::<()>()),
        );

        let cut_short = tokio::time::timeout(
            Duration::from_secs(5),
            estop.trigger(StopReason::Manual, StopScope::System, "op", None),
        )
        .await;
        assert!(cut_short.is_err());

        assert!(estop.is_stopped());
        assert_eq!(estop.stopped_components(), names(&["fast"]));
        assert_eq!(estop.status().total_triggers, 1);

        let result = estop.recover(None).await.unwrap();
        assert!(result.resumed);
        assert!(!estop.is_stopped());
    }

    #[test]
    fn stop_duration_serializes_as_seconds() {
        let result = StopResult {
            success: true,
            timestamp: Utc::now(),
            reason: StopReason::Manual,
            scope: StopScope::System,
            initiated_by: "op".to_string(),
            components_stopped: Vec::new(),
            already_stopped: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            duration: Duration::from_millis(1500),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["duration"], serde_json::json!(1.5));
    }

    #[tokio::test]
    async fn condition_bookkeeping() {
        let estop = EmergencyStop::default();
        let never = sync_handler(|(): ()| Ok(false));
        assert_eq!(
            estop.add_condition(StopCondition::new("narrow", StopReason::Manual, StopScope::Component, never)),
            Err(StopError::MissingTargets(StopScope::Component))
        );

        estop
            .add_condition(StopCondition::new(
                "cpu",
                StopReason::ResourceExhaustion,
                StopScope::System,
                sync_handler(|(): ()| Ok(false)),
            ))
            .unwrap();
        assert_eq!(estop.status().active_conditions, 1);
        estop.set_condition_enabled("cpu", false).unwrap();
        assert_eq!(estop.status().active_conditions, 0);
        assert_eq!(
            estop.set_condition_enabled("missing", true),
            Err(StopError::UnknownCondition("missing".to_string()))
        );
        assert!(estop.remove_condition("cpu"));
        assert!(estop.conditions().is_empty());
    }

    #[tokio::test]
    async fn fired_condition_disarms_until_reset() {
        let estop = EmergencyStop::default();
        let recovers = CallCounter::new();
        estop.register_component(component("a", &CallCounter::new(), &recovers));
        let firing = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&firing);
        estop
            .add_condition(StopCondition::new(
                "breach",
                StopReason::SecurityBreach,
                StopScope::System,
                sync_handler(move |(): ()| Ok(flag.load(Ordering::SeqCst))),
            ))
            .unwrap();

        let result = estop.check_conditions().await.unwrap();
        assert_eq!(result.initiated_by, "condition:breach");
        assert_eq!(result.reason, StopReason::SecurityBreach);
        assert!(!estop.status().monitoring_armed);

        // Stopped: polling is a no-op
        assert!(estop.check_conditions().await.is_none());

        // Full recovery re-arms
        estop.recover(None).await.unwrap();
        assert!(estop.status().monitoring_armed);
        assert!(estop.check_conditions().await.is_some());
        estop.recover(None).await.unwrap();

        firing.store(false, Ordering::SeqCst);
        assert!(estop.check_conditions().await.is_none());
    }

    #[tokio::test]
    async fn failing_condition_check_is_skipped() {
        let estop = EmergencyStop::default();
        estop
            .add_condition(StopCondition::new(
                "broken",
                StopReason::Manual,
                StopScope::System,
                sync_handler(|(): ()| -> HandlerResult<bool> { Err("probe down".into()) }),
            ))
            .unwrap();
        estop
            .add_condition(StopCondition::new(
                "disk",
                StopReason::ResourceExhaustion,
                StopScope::System,
                sync_handler(|(): ()| Ok(true)),
            ))
            .unwrap();

        let result = estop.check_conditions().await.unwrap();
        assert_eq!(result.reason, StopReason::ResourceExhaustion);
    }

    #[tokio::test]
    async fn status_reports_health() {
        let estop = EmergencyStop::default();
        assert_eq!(estop.status().health, Health::Healthy);
        estop
            .trigger(StopReason::ExternalSignal, StopScope::Global, "pager", None)
            .await
            .unwrap();
        let status = estop.status();
        assert_eq!(status.health, Health::Critical);
        assert_eq!(status.initiated_by.as_deref(), Some("pager"));
        assert!(status.stop_time.is_some());
    }
}
