//! Emergency stop scope containment and monitoring
//!
//! Tenet: a stop touches exactly the components its scope selects, and
//! the system never reports RUNNING while a component is still stopped.

use bulwark_estop::{
    EmergencyStop, EstopConfig, StopCondition, StopReason, StopScope, StoppableComponent,
};
use bulwark_kernel::sync_handler;
use bulwark_test_utils::CallCounter;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
}

fn register(estop: &EmergencyStop, count: usize, failing_recovery: &BTreeSet<usize>) {
    for index in 0..count {
        let recovery = if failing_recovery.contains(&index) {
            CallCounter::failing()
        } else {
            CallCounter::new()
        };
        estop.register_component(
            StoppableComponent::new(format!("c{index}"), CallCounter::new().handler::<()>())
                .with_recovery(recovery.handler::<()>())
                .in_subsystem(if index % 2 == 0 { "even" } else { "odd" }),
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn component_scope_stops_exactly_the_target(count in 1_usize..8, pick in 0_usize..8) {
        let target = format!("c{}", pick % count);
        let estop = EmergencyStop::default();
        register(&estop, count, &BTreeSet::new());

        let result = runtime().block_on(estop.trigger(
            StopReason::Manual,
            StopScope::Component,
            "prop",
            Some(&[target.clone()]),
        )).unwrap();

        prop_assert_eq!(result.components_stopped, vec![target.clone()]);
        prop_assert_eq!(estop.stopped_components(), vec![target]);
    }

    #[test]
    fn system_scope_stops_everything(count in 0_usize..8) {
        let estop = EmergencyStop::default();
        register(&estop, count, &BTreeSet::new());

        let result = runtime().block_on(
            estop.trigger(StopReason::Manual, StopScope::System, "prop", None),
        ).unwrap();

        prop_assert_eq!(result.components_stopped.len(), count);
        prop_assert_eq!(estop.stopped_components().len(), count);
    }

    #[test]
    fn never_running_while_a_component_is_stopped(
        count in 1_usize..8,
        failing in proptest::collection::btree_set(0_usize..8, 0..4),
    ) {
        let estop = EmergencyStop::default();
        register(&estop, count, &failing);
        let runtime = runtime();

        runtime.block_on(estop.trigger(StopReason::Manual, StopScope::System, "prop", None)).unwrap();
        let recovery = runtime.block_on(estop.recover(None)).unwrap();

        let stuck = failing.iter().filter(|i| **i < count).count();
        prop_assert_eq!(recovery.still_stopped.len(), stuck);
        prop_assert_eq!(estop.is_stopped(), stuck > 0);
        prop_assert_eq!(recovery.resumed, stuck == 0);
    }
}

#[tokio::test]
async fn subsystem_scope_selects_by_label() {
    let estop = EmergencyStop::default();
    register(&estop, 5, &BTreeSet::new());

    let result = estop
        .trigger(
            StopReason::CascadingFailure,
            StopScope::Subsystem,
            "operator",
            Some(&["odd".to_string()]),
        )
        .await
        .unwrap();
    assert_eq!(result.components_stopped, vec!["c1".to_string(), "c3".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn monitor_triggers_once_then_waits_for_reset() {
    let estop = Arc::new(EmergencyStop::new(
        EstopConfig::default().with_monitor_interval(Duration::from_secs(1)),
    ));
    register(&estop, 2, &BTreeSet::new());

    let firing = Arc::new(AtomicBool::new(false));
    let checks = Arc::new(AtomicUsize::new(0));
    let (flag, counted) = (Arc::clone(&firing), Arc::clone(&checks));
    estop
        .add_condition(
            StopCondition::new(
                "error_budget",
                StopReason::AnomalyDetected,
                StopScope::System,
                sync_handler(move |(): ()| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(flag.load(Ordering::SeqCst))
                }),
            )
            .with_description("error budget exhausted"),
        )
        .unwrap();

    let handle = estop.start_monitoring();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!estop.is_stopped());
    assert_eq!(checks.load(Ordering::SeqCst), 3);

    firing.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(estop.is_stopped());
    assert_eq!(estop.status().stop_reason, Some(StopReason::AnomalyDetected));

    // Stopped and disarmed: the condition is not polled
    let polled = checks.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(checks.load(Ordering::SeqCst), polled);
    assert_eq!(estop.history(10).len(), 1);

    handle.stop().await;
}
