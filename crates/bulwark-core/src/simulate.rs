//! Scripted incident run by `bulwark simulate`
//!
//! A dependency fails until its breaker opens, a latency metric spikes,
//! the ladder climbs to the stop level, the system stops after a
//! snapshot, state is corrupted while stopped, and recovery restores it.

use crate::config::PlaneConfig;
use crate::error::Result;
use crate::plane::{ControlPlane, PlaneStats};
use crate::policy::DEPENDENCY_KEY;
use bulwark_anomaly::AlertFilter;
use bulwark_estop::StoppableComponent;
use bulwark_kernel::{sync_handler, HandlerError};
use bulwark_rollback::RollbackComponent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Dependency whose breaker the scenario opens
pub const DEPENDENCY: &str = "payments";

/// Metric the scenario spikes
pub const METRIC: &str = "latency_ms";

/// Component the scenario stops and restores
pub const COMPONENT: &str = "orders";

const ACTOR: &str = "simulation";

/// One scenario phase and what it observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStep {
    /// Phase name
    pub phase: String,
    /// What happened
    pub detail: String,
}

/// Everything the scenario observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Phases in order
    pub steps: Vec<SimulationStep>,
    /// Component state after recovery
    pub final_state: Value,
    /// Plane statistics at the end
    pub stats: PlaneStats,
}

/// In-memory service with JSON state and a running flag
#[derive(Debug, Clone)]
struct DemoService {
    state: Arc<Mutex<Value>>,
    running: Arc<AtomicBool>,
}

impl DemoService {
    fn new(initial: Value) -> Self {
        Self {
            state: Arc::new(Mutex::new(initial)),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    fn set(&self, value: Value) {
        *self.state.lock() = value;
    }

    fn get(&self) -> Value {
        self.state.lock().clone()
    }

    fn rollback_component(&self) -> RollbackComponent {
        let saved = self.clone();
        let restored = self.clone();
        RollbackComponent::new(
            COMPONENT,
            sync_handler(move |(): ()| Ok(saved.get())),
            sync_handler(move |value: Value| {
                restored.set(value);
                Ok(())
            }),
        )
    }

    fn stoppable_component(&self) -> StoppableComponent {
        let stopped = Arc::clone(&self.running);
        let resumed = Arc::clone(&self.running);
        StoppableComponent::new(
            COMPONENT,
            sync_handler(move |(): ()| {
                stopped.store(false, Ordering::SeqCst);
                Ok(())
            }),
        )
        .with_recovery(sync_handler(move |(): ()| {
            resumed.store(true, Ordering::SeqCst);
            Ok(())
        }))
        .in_subsystem("checkout")
    }
}

#[derive(Default)]
struct Steps(Vec<SimulationStep>);

impl Steps {
    fn push(&mut self, phase: &str, detail: String) {
        tracing::info!(phase, %detail, "simulation step");
        self.0.push(SimulationStep {
            phase: phase.to_string(),
            detail,
        });
    }
}

/// Run the scenario against a plane built from `config`
///
/// # Errors
/// Returns `PlaneError` if the config is invalid or recovery is refused.
pub async fn run_simulation(config: PlaneConfig) -> Result<SimulationReport> {
    let plane = ControlPlane::new(config)?;
    let service = DemoService::new(json!({"orders": 0, "version": 1}));
    plane.rollback().register_component(service.rollback_component());
    plane.estop().register_component(service.stoppable_component());
    let mut steps = Steps::default();

    // Phase 1: the dependency fails until its breaker opens
    let breaker = plane.breakers().get_or_create(DEPENDENCY, None);
    let threshold = breaker.config().failure_threshold;
    for _ in 0..threshold {
        let _failed = breaker
            .execute(|| async { Err::<(), _>(std::io::Error::other("connection refused")) })
            .await;
    }
    let rejected = breaker
        .execute(|| async { Ok::<_, std::io::Error>(()) })
        .await
        .is_err_and(|e| e.is_open());
    steps.push(
        "breaker",
        format!("{DEPENDENCY} is {} after {threshold} failures, next call rejected: {rejected}", breaker.state()),
    );
    breaker.reset();

    // Phase 2: steady latency, then spikes blamed on the dependency
    for i in 0..30_u32 {
        plane.record(METRIC, 100.0 + f64::from(i % 5), None).await;
    }
    service.set(json!({"orders": 42, "version": 2}));
    let blame = BTreeMap::from([(DEPENDENCY_KEY.to_string(), json!(DEPENDENCY))]);
    for spike in [5_000.0, 50_000.0] {
        match plane.record(METRIC, spike, Some(blame.clone())).await {
            Some(alert) => steps.push(
                "anomaly",
                format!("{} {} alert on {METRIC}={spike}", alert.id, alert.severity),
            ),
            None => steps.push("anomaly", format!("{METRIC}={spike} raised no alert")),
        }
        steps.push("escalation", format!("ladder at {}", plane.ladder().level()));
    }

    // Phase 3: the stop, and damage done while stopped
    let stop = plane.estop().status();
    steps.push(
        "stop",
        format!(
            "stopped: {}, reason: {}, components stopped: {:?}",
            stop.is_stopped,
            stop.stop_reason.map_or("none", |r| r.as_str()),
            stop.stopped_components
        ),
    );
    service.set(json!({"orders": -1, "version": "corrupted"}));

    // Phase 4: operators acknowledge, then recover
    for event in plane.ladder().pending_acknowledgments() {
        plane.ladder().acknowledge(event.id, ACTOR)?;
    }
    for alert in plane.detector().alerts(&AlertFilter::new()) {
        plane.detector().acknowledge_alert(&alert.id)?;
    }
    let recovery = plane.recover(ACTOR).await?;
    steps.push(
        "recover",
        format!(
            "resumed: {}, restored: {:?}, breakers reset: {:?}, ladder at {}",
            recovery.recovery.resumed,
            recovery.rollback.map(|r| r.components_restored).unwrap_or_default(),
            recovery.breakers_reset,
            plane.ladder().level()
        ),
    );

    // Phase 5: traffic flows through the safety net again
    let running = Arc::clone(&service.running);
    let guarded = plane
        .guard(
            move |order| async move {
                if running.load(Ordering::SeqCst) {
                    Ok(order["id"].clone())
                } else {
                    Err(HandlerError::failed("service stopped"))
                }
            },
            json!({"id": 7}),
        )
        .await;
    let detail = match guarded {
        Ok(Ok(id)) => format!("order {id} accepted"),
        Ok(Err(err)) => format!("order failed: {err}"),
        Err(err) => format!("order blocked: {err}"),
    };
    steps.push("guard", detail);

    Ok(SimulationReport {
        steps: steps.0,
        final_state: service.get(),
        stats: plane.stats(),
    })
}
