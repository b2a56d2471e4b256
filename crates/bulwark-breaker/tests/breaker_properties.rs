//! Property tests for breaker monotonicity
//!
//! Tenet: a breaker opens only after enough counted failures and closes
//! only after enough consecutive probe successes.

use bulwark_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use proptest::prelude::*;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Step {
    Succeed,
    Fail,
    Wait,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![Just(Step::Succeed), Just(Step::Fail), Just(Step::Wait)]
}

#[derive(Debug, Clone, Copy)]
enum Seen {
    Success,
    Failure,
    Change(BreakerState, BreakerState),
}

fn run(failure_threshold: u32, success_threshold: u32, steps: &[Step]) -> Vec<Seen> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let breaker = CircuitBreaker::new(
            "prop",
            BreakerConfig::new()
                .with_failure_threshold(failure_threshold)
                .with_success_threshold(success_threshold)
                .with_open_timeout(Duration::from_secs(5))
                .with_monitoring_window(Duration::from_secs(3600)),
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        breaker.on_state_change(move |change| {
            sink.lock().expect("log").push(Seen::Change(change.from, change.to));
        });

        for step in steps {
            match step {
                Step::Succeed => {
                    let sink = Arc::clone(&log);
                    let _ = breaker
                        .execute(|| async move {
                            sink.lock().expect("log").push(Seen::Success);
                            Ok::<_, io::Error>(())
                        })
                        .await;
                }
                Step::Fail => {
                    let sink = Arc::clone(&log);
                    let _ = breaker
                        .execute(|| async move {
                            sink.lock().expect("log").push(Seen::Failure);
                            Err::<(), _>(io::Error::other("fail"))
                        })
                        .await;
                }
                Step::Wait => tokio::time::advance(Duration::from_secs(5)).await,
            }
        }

        let seen = log.lock().expect("log").clone();
        seen
    })
}

proptest! {
    #[test]
    fn opens_only_after_threshold_failures(
        failure_threshold in 1u32..5,
        success_threshold in 1u32..4,
        steps in prop::collection::vec(step(), 0..60),
    ) {
        let seen = run(failure_threshold, success_threshold, &steps);

        let mut failures_since_closed = 0u32;
        let mut probe_successes = 0u32;
        let mut state = BreakerState::Closed;

        for event in seen {
            match event {
                Seen::Failure => {
                    if state == BreakerState::Closed {
                        failures_since_closed += 1;
                    }
                }
                Seen::Success => {
                    if state == BreakerState::HalfOpen {
                        probe_successes += 1;
                    }
                }
                Seen::Change(from, to) => {
                    prop_assert_eq!(from, state);
                    match (from, to) {
                        (BreakerState::Closed, BreakerState::Open) => {
                            prop_assert!(failures_since_closed >= failure_threshold);
                        }
                        (BreakerState::HalfOpen, BreakerState::Closed) => {
                            prop_assert!(probe_successes >= success_threshold);
                        }
                        _ => {}
                    }
                    if to == BreakerState::Closed {
                        failures_since_closed = 0;
                    }
                    probe_successes = 0;
                    state = to;
                }
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn three_failures_open_then_probe_closes() {
    let breaker = CircuitBreaker::new(
        "scenario",
        BreakerConfig::new()
            .with_failure_threshold(3)
            .with_success_threshold(1)
            .with_open_timeout(Duration::from_secs(5)),
    );

    for _ in 0..3 {
        let result = breaker
            .execute(|| async { Err::<(), _>(io::Error::other("down")) })
            .await;
        assert!(!result.is_err_and(|e| e.is_open()));
    }
    assert_eq!(breaker.state(), BreakerState::Open);

    let dispatched = AtomicBool::new(false);
    let fourth = breaker
        .execute(|| async {
            dispatched.store(true, Ordering::SeqCst);
            Ok::<_, io::Error>(())
        })
        .await;
    assert!(fourth.is_err_and(|e| e.is_open()));
    assert!(!dispatched.load(Ordering::SeqCst));

    tokio::time::advance(Duration::from_secs(5)).await;

    let probe = breaker
        .execute(|| async { Ok::<_, io::Error>("pong") })
        .await;
    assert_eq!(probe.ok(), Some("pong"));
    assert_eq!(breaker.state(), BreakerState::Closed);
}
