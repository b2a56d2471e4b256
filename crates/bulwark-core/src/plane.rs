//! The control plane
//!
//! [`ControlPlane`] builds every mechanism once from a [`PlaneConfig`] and
//! hands out `Arc`s to them. Anomaly alerts are answered by the response
//! policy: severity escalates the ladder, critical dependency alerts trip
//! breakers, and reaching the stop level stops the whole system after a
//! FULL snapshot.

use crate::config::PlaneConfig;
use crate::error::{PlaneError, Result};
use crate::policy::{ResponsePolicy, DEPENDENCY_KEY};
use bulwark_anomaly::{AlertId, AnomalyAlert, AnomalyDetector, DetectorStats, Severity};
use bulwark_breaker::{BreakerRegistry, BreakerStats};
use bulwark_escalation::{EscalationLadder, EscalationLevel, EscalationOutcome, LadderStatus};
use bulwark_estop::{EmergencyStop, RecoveryResult, StopReason, StopResult, StopScope, StopStatus};
use bulwark_kernel::{HandlerError, Health, LoopHandle};
use bulwark_rollback::{RollbackResult, RollbackStats, RollbackSystem, SnapshotId, SnapshotRequest};
use bulwark_safety_net::{circuit_closed, SafetyError, SafetyNet, SafetyNetStats};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Actor recorded for moves made by the plane itself
pub const PLANE_ACTOR: &str = "control-plane";

const RESPONSE_HISTORY: usize = 100;

/// What the plane did about one alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertResponse {
    /// Alert answered
    pub alert: AlertId,
    /// Alert severity
    pub severity: Severity,
    /// Breaker tripped for the alert's dependency
    pub tripped: Option<String>,
    /// Ladder move, if one was attempted and accepted
    pub escalation: Option<EscalationOutcome>,
    /// Escalation refused by the ladder's rate limit
    pub rate_limited: bool,
    /// System stop triggered because the stop level was reached
    pub stop: Option<StopResult>,
}

/// Outcome of [`ControlPlane::recover`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneRecovery {
    /// Restore of the pre-stop snapshot, if one was captured
    pub rollback: Option<RollbackResult>,
    /// Emergency stop recovery
    pub recovery: RecoveryResult,
    /// Breakers reset because the plane had tripped them
    pub breakers_reset: Vec<String>,
    /// Ladder move back to NORMAL, once the stop was lifted
    pub de_escalation: Option<EscalationOutcome>,
}

impl PlaneRecovery {
    /// Check if the stop was lifted and every restore succeeded
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.recovery.resumed && self.rollback.as_ref().map_or(true, |r| r.success)
    }
}

/// Aggregated statistics of every mechanism
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneStats {
    /// Plane name
    pub name: String,
    /// Collection time
    pub timestamp: DateTime<Utc>,
    /// Breakers by name
    pub breakers: BTreeMap<String, BreakerStats>,
    /// Escalation ladder
    pub escalation: LadderStatus,
    /// Rollback system
    pub rollback: RollbackStats,
    /// Anomaly detector
    pub anomaly: DetectorStats,
    /// Emergency stop
    pub estop: StopStatus,
    /// Safety net
    pub safety_net: SafetyNetStats,
    /// Alerts answered by the response policy
    pub responses: u64,
    /// Worst health across all mechanisms
    pub health: Health,
}

#[derive(Debug, Default)]
struct ResponseLog {
    recent: VecDeque<AlertResponse>,
    total: u64,
}

/// The part of the plane that answers alerts
///
/// Holds no reference to the detector, which owns a handler pointing here.
struct Responder {
    policy: ResponsePolicy,
    trip_breakers: bool,
    escalate: bool,
    snapshot: bool,
    stop: bool,
    breakers: Arc<BreakerRegistry>,
    ladder: Arc<EscalationLadder>,
    rollback: Arc<RollbackSystem>,
    estop: Arc<EmergencyStop>,
    stop_snapshot: Mutex<Option<SnapshotId>>,
    tripped: Mutex<BTreeSet<String>>,
    log: Mutex<ResponseLog>,
}

impl Responder {
    async fn respond(&self, alert: &AnomalyAlert) -> AlertResponse {
        let mut response = AlertResponse {
            alert: alert.id.clone(),
            severity: alert.severity,
            tripped: None,
            escalation: None,
            rate_limited: false,
            stop: None,
        };

        if alert.severity == Severity::Critical
            && self.trip_breakers
            && self.policy.trip_on_critical_dependency
        {
            if let Some(dependency) = alert.metadata_str(DEPENDENCY_KEY) {
                self.breakers.get_or_create(dependency, None).trip();
                self.tripped.lock().insert(dependency.to_string());
                tracing::warn!(alert = %alert.id, dependency, "tripped breaker for critical alert");
                response.tripped = Some(dependency.to_string());
            }
        }

        let steps = self.policy.steps_for(alert.severity);
        if steps > 0 && self.escalate {
            let reason = format!("{} anomaly on {}: {}", alert.severity, alert.metric, alert.description);
            match self.ladder.escalate(&reason, PLANE_ACTOR, steps).await {
                Ok(outcome) => response.escalation = Some(outcome),
                Err(err) => {
                    tracing::warn!(alert = %alert.id, error = %err, "escalation refused");
                    response.rate_limited = err.is_rate_limited();
                }
            }
        }

        let detail = format!("anomaly {} on {}", alert.id, alert.metric);
        response.stop = self.enforce_stop_level(StopReason::AnomalyDetected, &detail).await;

        let mut log = self.log.lock();
        log.total += 1;
        log.recent.push_back(response.clone());
        while log.recent.len() > RESPONSE_HISTORY {
            log.recent.pop_front();
        }
        drop(log);

        response
    }

    /// Stop the system if the ladder sits at or above the stop level
    async fn enforce_stop_level(&self, reason: StopReason, detail: &str) -> Option<StopResult> {
        let level = self.ladder.level();
        if !self.stop || !self.policy.requires_stop(level) || self.estop.is_stopped() {
            return None;
        }

        if self.snapshot && self.policy.auto_rollback {
            let request = SnapshotRequest::full()
                .with_metadata("reason", Value::String(detail.to_string()))
                .with_metadata("level", Value::String(level.to_string()));
            match self.rollback.create_snapshot(request).await {
                Ok(receipt) => {
                    tracing::info!(snapshot = %receipt.id, components = receipt.components.len(), "captured pre-stop snapshot");
                    *self.stop_snapshot.lock() = Some(receipt.id);
                }
                Err(err) => tracing::warn!(error = %err, "pre-stop snapshot failed"),
            }
        }

        let initiated_by = format!("{PLANE_ACTOR}: {detail}");
        match self.estop.trigger(reason, StopScope::System, &initiated_by, None).await {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::error!(error = %err, "system stop refused");
                None
            }
        }
    }
}

/// One explicit registry of the six resilience mechanisms
pub struct ControlPlane {
    config: PlaneConfig,
    detector: Arc<AnomalyDetector>,
    safety_net: Arc<SafetyNet<Value>>,
    responder: Arc<Responder>,
}

impl fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlane")
            .field("name", &self.config.name)
            .field("level", &self.responder.ladder.level())
            .field("stopped", &self.responder.estop.is_stopped())
            .finish_non_exhaustive()
    }
}

impl ControlPlane {
    /// Validate `config` and construct every mechanism
    ///
    /// Named breakers are registered up front and gate the safety net
    /// through a `circuit_<name>` check.
    ///
    /// # Errors
    /// `PlaneError::Config` if validation fails.
    pub fn new(config: PlaneConfig) -> Result<Self> {
        config.validate()?;

        let breakers = Arc::new(BreakerRegistry::new(config.breakers.settings.default.clone()));
        let safety_net = Arc::new(SafetyNet::with_default_checks(config.safety_net.settings.clone()));
        for (name, breaker_config) in &config.breakers.settings.named {
            let breaker = breakers.register(name.clone(), breaker_config.clone());
            if config.safety_net.enabled {
                safety_net.add_check(circuit_closed(breaker));
            }
        }

        let detector = Arc::new(AnomalyDetector::new(config.anomaly.settings.clone())?);
        let responder = Arc::new(Responder {
            policy: config.response.clone(),
            trip_breakers: config.breakers.enabled,
            escalate: config.escalation.enabled,
            snapshot: config.rollback.enabled,
            stop: config.estop.enabled,
            breakers,
            ladder: Arc::new(EscalationLadder::new(config.escalation.settings.clone())),
            rollback: Arc::new(RollbackSystem::new(config.rollback.settings.clone())),
            estop: Arc::new(EmergencyStop::new(config.estop.settings.clone())),
            stop_snapshot: Mutex::new(None),
            tripped: Mutex::new(BTreeSet::new()),
            log: Mutex::new(ResponseLog::default()),
        });

        if config.response.enabled {
            let handler_target = Arc::clone(&responder);
            // The response runs as its own task: the detector's handler
            // timeout may stop waiting for it but never cuts a stop short.
            detector.add_handler(None, move |alert: AnomalyAlert| {
                let responder = Arc::clone(&handler_target);
                let response = tokio::spawn(async move { responder.respond(&alert).await });
                async move {
                    response
                        .await
                        .map(drop)
                        .map_err(|e| HandlerError::failed(format!("alert response aborted: {e}")))
                }
            });
        }

        tracing::info!(
            plane = %config.name,
            breakers = config.breakers.settings.named.len(),
            response = config.response.enabled,
            "control plane ready"
        );
        Ok(Self {
            config,
            detector,
            safety_net,
            responder,
        })
    }

    /// Configuration the plane was built from
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PlaneConfig {
        &self.config
    }

    /// Circuit breakers
    #[inline]
    #[must_use]
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.responder.breakers
    }

    /// Escalation ladder
    #[inline]
    #[must_use]
    pub fn ladder(&self) -> &Arc<EscalationLadder> {
        &self.responder.ladder
    }

    /// Rollback system
    #[inline]
    #[must_use]
    pub fn rollback(&self) -> &Arc<RollbackSystem> {
        &self.responder.rollback
    }

    /// Anomaly detector
    #[inline]
    #[must_use]
    pub fn detector(&self) -> &Arc<AnomalyDetector> {
        &self.detector
    }

    /// Emergency stop
    #[inline]
    #[must_use]
    pub fn estop(&self) -> &Arc<EmergencyStop> {
        &self.responder.estop
    }

    /// Safety net for JSON payloads
    #[inline]
    #[must_use]
    pub fn safety_net(&self) -> &Arc<SafetyNet<Value>> {
        &self.safety_net
    }

    /// Feed a metric sample; alerts are answered before this returns
    /// unless the response outlives the detector's handler timeout, in
    /// which case it keeps running in the background
    ///
    /// Returns `None` without recording when the anomaly section is
    /// disabled.
    pub async fn record(
        &self,
        metric: &str,
        value: f64,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> Option<AnomalyAlert> {
        if !self.config.anomaly.enabled {
            return None;
        }
        self.detector.record(metric, value, metadata).await
    }

    /// Escalate by hand, stopping the system if the stop level is reached
    ///
    /// # Errors
    /// `PlaneError::Escalation` if the ladder's rate limit refuses the move.
    pub async fn escalate(&self, reason: &str, triggered_by: &str, levels: u8) -> Result<EscalationOutcome> {
        let outcome = self.responder.ladder.escalate(reason, triggered_by, levels).await?;
        let detail = format!("manual escalation by {triggered_by}");
        self.responder.enforce_stop_level(StopReason::Manual, &detail).await;
        Ok(outcome)
    }

    /// Run `operation` on `payload` behind the safety net
    ///
    /// With the safety net section disabled the operation runs unchecked.
    ///
    /// # Errors
    /// `SafetyError::CheckFailed` if a blocking check failed.
    pub async fn guard<F, Fut, O>(&self, operation: F, payload: Value) -> std::result::Result<O, SafetyError>
    where
        F: FnOnce(Arc<Value>) -> Fut,
        Fut: Future<Output = O>,
    {
        if !self.config.safety_net.enabled {
            return Ok(operation(Arc::new(payload)).await);
        }
        self.safety_net.execute(operation, payload).await
    }

    /// Undo a stop: restore the pre-stop snapshot, recover every stopped
    /// component, reset breakers the plane tripped, and return the ladder
    /// to NORMAL once the stop is lifted
    ///
    /// # Errors
    /// `PlaneError::Rollback` if the pre-stop snapshot is no longer
    /// retained; it is kept for a retry in that case.
    pub async fn recover(&self, initiated_by: &str) -> Result<PlaneRecovery> {
        let responder = &self.responder;

        let snapshot = responder.stop_snapshot.lock().take();
        let rollback = match snapshot {
            Some(id) => match responder
                .rollback
                .rollback(id, responder.policy.rollback_strategy, None)
                .await
            {
                Ok(result) => Some(result),
                Err(err) => {
                    *responder.stop_snapshot.lock() = Some(id);
                    return Err(err.into());
                }
            },
            None => None,
        };

        let recovery = responder.estop.recover(None).await?;

        let tripped: Vec<String> = std::mem::take(&mut *responder.tripped.lock()).into_iter().collect();
        for name in &tripped {
            if let Some(breaker) = responder.breakers.get(name) {
                breaker.reset();
            }
        }

        let de_escalation = if recovery.resumed {
            let reason = format!("recovered by {initiated_by}");
            Some(
                responder
                    .ladder
                    .set_level(EscalationLevel::Normal, &reason, initiated_by)
                    .await?,
            )
        } else {
            None
        };

        tracing::info!(
            plane = %self.config.name,
            initiated_by,
            restored = rollback.as_ref().map_or(0, |r| r.components_restored.len()),
            resumed = recovery.resumed,
            "control plane recovered"
        );
        Ok(PlaneRecovery {
            rollback,
            recovery,
            breakers_reset: tripped,
            de_escalation,
        })
    }

    /// Snapshot captured before the stop in effect, if any
    #[must_use]
    pub fn stop_snapshot(&self) -> Option<SnapshotId> {
        *self.responder.stop_snapshot.lock()
    }

    /// Most recent alert responses, oldest first
    #[must_use]
    pub fn recent_responses(&self, limit: usize) -> Vec<AlertResponse> {
        let log = self.responder.log.lock();
        let skip = log.recent.len().saturating_sub(limit);
        log.recent.iter().skip(skip).cloned().collect()
    }

    /// Start the escalation supervisor and the stop-condition monitor
    ///
    /// Disabled sections start nothing.
    #[must_use]
    pub fn start(&self) -> Vec<LoopHandle> {
        let mut loops = Vec::new();
        if self.config.escalation.enabled {
            loops.push(self.responder.ladder.supervise(self.config.supervise_interval));
        }
        if self.config.estop.enabled {
            loops.push(self.responder.estop.start_monitoring());
        }
        loops
    }

    /// Statistics of every mechanism and the worst health among them
    #[must_use]
    pub fn stats(&self) -> PlaneStats {
        let responder = &self.responder;
        let breakers = responder.breakers.all_stats();
        let escalation = responder.ladder.status();
        let rollback = responder.rollback.stats();
        let anomaly = self.detector.stats();
        let estop = responder.estop.status();
        let safety_net = self.safety_net.stats();
        let health = Health::worst_of([
            responder.breakers.health(),
            escalation.health,
            rollback.health,
            anomaly.health,
            estop.health,
            safety_net.health,
        ]);

        PlaneStats {
            name: self.config.name.clone(),
            timestamp: Utc::now(),
            breakers,
            escalation,
            rollback,
            anomaly,
            estop,
            safety_net,
            responses: responder.log.lock().total,
            health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Section;
    use bulwark_anomaly::{DetectorConfig, MetricConfig};
    use bulwark_breaker::BreakerState;
    use bulwark_escalation::LadderConfig;
    use serde_json::json;

    fn quiet_ladder() -> LadderConfig {
        LadderConfig::default()
            .with_register_defaults(false)
            .with_auto_de_escalate(false)
    }

    fn plane(config: PlaneConfig) -> ControlPlane {
        ControlPlane::new(config.with_escalation(quiet_ladder())).unwrap()
    }

    fn bounded(max: f64) -> DetectorConfig {
        DetectorConfig::default().with_metric("latency", MetricConfig::statistical().with_max(max))
    }

    fn dependency(name: &str) -> Option<BTreeMap<String, Value>> {
        Some(BTreeMap::from([(DEPENDENCY_KEY.to_string(), json!(name))]))
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PlaneConfig::default().with_response(ResponsePolicy::default().with_steps(1, 0));
        assert!(matches!(ControlPlane::new(config), Err(PlaneError::Config(_))));
    }

    #[tokio::test]
    async fn high_alert_escalates_one_level() {
        let plane = plane(PlaneConfig::default().with_anomaly(bounded(100.0)));

        // 180 is 1.8 times the limit
        let alert = plane.record("latency", 180.0, None).await.unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(plane.ladder().level(), EscalationLevel::Warning);

        let responses = plane.recent_responses(10);
        assert_eq!(responses.len(), 1);
        assert!(responses[0].tripped.is_none());
        assert!(responses[0].stop.is_none());
    }

    #[tokio::test]
    async fn critical_dependency_alert_trips_breaker() {
        let plane = plane(PlaneConfig::default().with_anomaly(bounded(100.0)));

        let alert = plane.record("latency", 500.0, dependency("payments")).await.unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(plane.breakers().get("payments").unwrap().state(), BreakerState::Open);
        assert_eq!(plane.ladder().level(), EscalationLevel::Alert);
        assert_eq!(plane.recent_responses(1)[0].tripped.as_deref(), Some("payments"));
    }

    #[tokio::test]
    async fn disabled_policy_leaves_mechanisms_alone() {
        let config = PlaneConfig::default()
            .with_anomaly(bounded(100.0))
            .with_response(ResponsePolicy::default().disabled());
        let plane = plane(config);

        assert!(plane.record("latency", 500.0, dependency("payments")).await.is_some());
        assert_eq!(plane.ladder().level(), EscalationLevel::Normal);
        assert!(plane.breakers().get("payments").is_none());
        assert!(plane.recent_responses(10).is_empty());
    }

    #[tokio::test]
    async fn disabled_anomaly_section_records_nothing() {
        let mut config = PlaneConfig::default().with_anomaly(bounded(100.0));
        config.anomaly = Section::disabled(config.anomaly.settings);
        let plane = plane(config);

        assert!(plane.record("latency", 500.0, None).await.is_none());
        assert_eq!(plane.detector().stats().samples_recorded, 0);
    }

    #[tokio::test]
    async fn manual_escalation_to_stop_level_stops_system() {
        let plane = plane(PlaneConfig::default());

        plane.escalate("operator decision", "alice", 4).await.unwrap();
        assert!(plane.estop().is_stopped());
        assert_eq!(plane.estop().stop_reason(), Some(StopReason::Manual));
        assert!(plane.stop_snapshot().is_some());

        let recovery = plane.recover("alice").await.unwrap();
        assert!(recovery.is_complete());
        assert!(!plane.estop().is_stopped());
        assert_eq!(plane.ladder().level(), EscalationLevel::Normal);
        assert!(plane.stop_snapshot().is_none());
    }

    #[tokio::test]
    async fn named_breakers_gate_the_safety_net() {
        let config = PlaneConfig::default().with_breaker("payments", bulwark_breaker::BreakerConfig::default());
        let plane = plane(config);

        let ok = plane.guard(|data| async move { data["amount"].clone() }, json!({"amount": 5})).await;
        assert_eq!(ok.unwrap(), json!(5));

        plane.breakers().get("payments").unwrap().trip();
        let blocked = plane.guard(|_data| async {}, json!({"amount": 5})).await.unwrap_err();
        assert_eq!(blocked.failures()[0].check, "circuit_payments");
    }

    #[tokio::test]
    async fn stats_report_worst_health() {
        let plane = plane(PlaneConfig::default());
        assert_eq!(plane.stats().health, Health::Healthy);

        plane.breakers().get_or_create("search", None).trip();
        let stats = plane.stats();
        assert_eq!(stats.health, Health::Critical);
        assert!(stats.breakers.contains_key("search"));
    }
}
