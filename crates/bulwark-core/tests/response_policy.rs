//! Alert responses across the whole plane
//!
//! Tenet: an alert moves the other mechanisms exactly as the response
//! policy says, and recovery puts every mechanism back where it started.

use bulwark_anomaly::{DetectorConfig, MetricConfig, Severity};
use bulwark_breaker::BreakerState;
use bulwark_core::{ControlPlane, PlaneConfig, ResponsePolicy, Section, DEPENDENCY_KEY};
use bulwark_escalation::{EscalationLevel, LadderConfig};
use bulwark_estop::{StopReason, StopScope, StoppableComponent};
use bulwark_kernel::{HandlerError, Health};
use bulwark_rollback::RollbackComponent;
use bulwark_test_utils::{init_test_tracing, CallCounter, StateCell};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

fn config() -> PlaneConfig {
    PlaneConfig::default()
        .with_escalation(
            LadderConfig::default()
                .with_register_defaults(false)
                .with_auto_de_escalate(false),
        )
        .with_anomaly(
            DetectorConfig::default()
                .with_metric("error_rate", MetricConfig::statistical().with_max(0.1)),
        )
}

fn blame(dependency: &str) -> Option<BTreeMap<String, Value>> {
    Some(BTreeMap::from([(DEPENDENCY_KEY.to_string(), json!(dependency))]))
}

/// Register `cell` with rollback and estop; returns its stop counter
fn manage(plane: &ControlPlane, cell: &StateCell) -> (CallCounter, CallCounter) {
    let stops = CallCounter::new();
    let recoveries = CallCounter::new();
    plane.rollback().register_component(RollbackComponent::new(
        cell.name(),
        cell.save_handler(),
        cell.restore_handler(),
    ));
    plane.estop().register_component(
        StoppableComponent::new(cell.name(), stops.handler::<()>())
            .with_recovery(recoveries.handler::<()>()),
    );
    (stops, recoveries)
}

#[tokio::test]
async fn two_critical_alerts_stop_and_recovery_restores() {
    init_test_tracing();
    let plane = ControlPlane::new(config()).unwrap();
    let ledger = StateCell::new("ledger", json!({"balance": 100}));
    let (stops, recoveries) = manage(&plane, &ledger);

    // 0.5 is five times the limit
    let first = plane.record("error_rate", 0.5, blame("payments")).await.unwrap();
    assert_eq!(first.severity, Severity::Critical);
    assert_eq!(plane.ladder().level(), EscalationLevel::Alert);
    assert!(!plane.estop().is_stopped());

    plane.record("error_rate", 0.5, blame("payments")).await.unwrap();
    assert_eq!(plane.ladder().level(), EscalationLevel::Emergency);
    assert!(plane.estop().is_stopped());
    assert_eq!(plane.estop().stop_reason(), Some(StopReason::AnomalyDetected));
    assert_eq!(plane.estop().stop_scope(), Some(StopScope::System));
    assert_eq!(stops.count(), 1);

    let snapshot = plane.stop_snapshot().unwrap();
    let captured = plane.rollback().get_snapshot(snapshot).unwrap();
    assert_eq!(captured.data["ledger"], json!({"balance": 100}));

    let responses = plane.recent_responses(10);
    assert_eq!(responses.len(), 2);
    assert!(responses[0].stop.is_none());
    assert!(responses[1].stop.as_ref().is_some_and(|s| s.success));

    ledger.set(json!({"balance": -999}));
    let recovery = plane.recover("oncall").await.unwrap();

    assert!(recovery.is_complete());
    assert_eq!(ledger.get(), json!({"balance": 100}));
    assert_eq!(recoveries.count(), 1);
    assert_eq!(recovery.breakers_reset, vec!["payments".to_string()]);
    assert_eq!(plane.breakers().get("payments").unwrap().state(), BreakerState::Closed);
    assert_eq!(plane.ladder().level(), EscalationLevel::Normal);
    assert!(!plane.estop().is_stopped());
}

#[tokio::test]
async fn stop_without_auto_rollback_takes_no_snapshot() {
    let config = config().with_response(ResponsePolicy::default().with_auto_rollback(false));
    let plane = ControlPlane::new(config).unwrap();
    let cell = StateCell::new("cache", json!([]));
    manage(&plane, &cell);

    plane.escalate("operator", "bob", 5).await.unwrap();
    assert!(plane.estop().is_stopped());
    assert!(plane.stop_snapshot().is_none());
    assert_eq!(cell.saves(), 0);

    let recovery = plane.recover("bob").await.unwrap();
    assert!(recovery.rollback.is_none());
    assert!(recovery.is_complete());
}

#[tokio::test]
async fn disabled_estop_section_never_stops() {
    let mut config = config();
    config.estop = Section::disabled(config.estop.settings);
    let plane = ControlPlane::new(config).unwrap();

    plane.escalate("operator", "bob", 5).await.unwrap();
    assert_eq!(plane.ladder().level(), EscalationLevel::Disaster);
    assert!(!plane.estop().is_stopped());
    assert!(plane.stop_snapshot().is_none());
}

#[tokio::test]
async fn rate_limited_escalation_is_reported() {
    let config = config().with_escalation(
        LadderConfig::default()
            .with_register_defaults(false)
            .with_auto_de_escalate(false)
            .with_max_escalation_rate(1),
    );
    let plane = ControlPlane::new(config).unwrap();

    // 0.17 is 1.7 times the limit: HIGH, one step each
    plane.record("error_rate", 0.17, None).await.unwrap();
    plane.record("error_rate", 0.17, None).await.unwrap();

    let responses = plane.recent_responses(10);
    assert!(responses[0].escalation.is_some());
    assert!(responses[1].rate_limited);
    assert_eq!(plane.ladder().level(), EscalationLevel::Warning);
}

#[tokio::test]
async fn recovery_with_failing_component_keeps_ladder_up() {
    let plane = ControlPlane::new(config()).unwrap();
    let stuck = CallCounter::new();
    plane
        .estop()
        .register_component(StoppableComponent::new("stuck", stuck.handler::<()>()));

    plane.escalate("operator", "bob", 4).await.unwrap();
    let recovery = plane.recover("bob").await.unwrap();

    assert!(!recovery.recovery.resumed);
    assert!(recovery.de_escalation.is_none());
    assert!(!recovery.is_complete());
    assert_eq!(plane.ladder().level(), EscalationLevel::Emergency);
    assert_eq!(plane.stats().health, Health::Critical);
}

#[tokio::test(start_paused = true)]
async fn started_loops_stop_cleanly() {
    let plane = ControlPlane::new(config()).unwrap();
    let loops = plane.start();
    assert_eq!(loops.len(), 2);

    tokio::time::sleep(Duration::from_secs(3)).await;
    for handle in loops {
        handle.stop().await;
    }
}

#[tokio::test(start_paused = true)]
async fn slow_stop_outlives_alert_handler_timeout() {
    let config = config().with_anomaly(
        DetectorConfig::default()
            .with_metric("error_rate", MetricConfig::statistical().with_max(0.1))
            .with_handler_timeout(Some(Duration::from_secs(10))),
    );
    let plane = ControlPlane::new(config).unwrap();
    let fast = CallCounter::new();
    plane
        .estop()
        .register_component(StoppableComponent::new("fast", fast.handler::<()>()));
    plane.estop().register_component(StoppableComponent::new("slow", |(): ()| async {
        tokio::time::sleep(Duration::from_secs(15)).await;
        Ok::<(), HandlerError>(())
    }));

    plane.record("error_rate", 0.5, None).await.unwrap();
    plane.record("error_rate", 0.5, None).await.unwrap();

    // The detector stopped waiting; the stop is already in effect
    assert_eq!(plane.ladder().level(), EscalationLevel::Emergency);
    assert!(plane.estop().is_stopped());
    assert_eq!(plane.estop().stopped_components(), vec!["fast".to_string()]);
    assert_eq!(plane.estop().status().total_triggers, 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
        plane.estop().stopped_components(),
        vec!["fast".to_string(), "slow".to_string()]
    );
    assert_eq!(plane.estop().history(10).len(), 1);
    let responses = plane.recent_responses(10);
    assert_eq!(responses.len(), 2);
    assert!(responses[1].stop.as_ref().is_some_and(|s| s.success));
}
