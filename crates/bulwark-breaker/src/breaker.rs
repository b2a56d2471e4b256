//! Circuit breaker
//!
//! The bookkeeping lock is held only while admitting a call and while
//! recording its outcome; the guarded operation, the fallback and the
//! state-change listeners all run with no lock held.

use crate::config::BreakerConfig;
use crate::error::BreakerError;
use crate::state::{transition, BreakerEvent, BreakerState};
use bulwark_kernel::{call_listener, Health};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One accepted state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    /// Breaker name
    pub breaker: String,
    /// Previous state
    pub from: BreakerState,
    /// New state
    pub to: BreakerState,
    /// When the change happened
    pub at: DateTime<Utc>,
}

/// Lifetime call counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Calls submitted, including rejected ones
    pub total_calls: u64,
    /// Operations that returned `Ok`
    pub successful_calls: u64,
    /// Operations that returned a counted error
    pub failed_calls: u64,
    /// Operations that returned an excluded error
    pub excluded_failures: u64,
    /// Calls rejected while OPEN
    pub rejected_calls: u64,
    /// Completed calls at or above the slow threshold
    pub slow_calls: u64,
    /// Number of state changes
    pub state_changes: u64,
    /// Last counted failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Last success
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last state change
    pub last_state_change_at: Option<DateTime<Utc>>,
}

/// Snapshot of a breaker for dashboards and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStats {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: BreakerState,
    /// Counted failures inside the monitoring window
    pub failure_count: usize,
    /// Successes in the current HALF_OPEN period
    pub success_count: u32,
    /// Lifetime counters
    pub metrics: BreakerMetrics,
    /// Health classification
    pub health: Health,
}

type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;
type Exclusion = Box<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Success,
    Failure,
    Excluded,
}

#[derive(Debug, Default)]
struct Inner {
    state: BreakerState,
    failures: VecDeque<Instant>,
    probe_successes: u32,
    opened_at: Option<Instant>,
    metrics: BreakerMetrics,
}

impl Inner {
    fn prune_failures(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn open_timeout_elapsed(&self, now: Instant, timeout: Duration) -> bool {
        self.opened_at
            .is_some_and(|opened| now.duration_since(opened) >= timeout)
    }
}

/// Per-dependency circuit breaker
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    listeners: RwLock<Vec<Listener>>,
    exclusions: RwLock<Vec<Exclusion>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a CLOSED breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::default()),
            listeners: RwLock::new(Vec::new()),
            exclusions: RwLock::new(Vec::new()),
        }
    }

    /// Breaker name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current stored state
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Check whether a call submitted now would be dispatched
    #[must_use]
    pub fn is_call_permitted(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                inner.open_timeout_elapsed(Instant::now(), self.config.open_timeout)
            }
        }
    }

    /// Do not count errors of type `X` (anywhere in the source chain) as
    /// failures
    pub fn exclude<X: StdError + 'static>(&self) {
        self.exclusions.write().push(Box::new(|err| err.is::<X>()));
    }

    /// Do not count errors matching `predicate` as failures
    pub fn exclude_when<P>(&self, predicate: P)
    where
        P: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        self.exclusions.write().push(Box::new(predicate));
    }

    /// Register a state-change listener
    pub fn on_state_change<L>(&self, listener: L)
    where
        L: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Run `operation` through the breaker
    ///
    /// # Errors
    /// - `BreakerError::Open` if the breaker rejected the call
    /// - `BreakerError::Operation` if the operation failed
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        if !self.admit() {
            return Err(BreakerError::Open {
                name: self.name.clone(),
            });
        }
        self.dispatch(operation).await.map_err(BreakerError::Operation)
    }

    /// Run `operation`, using `fallback` when the call is rejected or fails
    ///
    /// # Errors
    /// Returns the fallback's error if the fallback ran and failed.
    pub async fn execute_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        if !self.admit() {
            return fallback().await;
        }
        match self.dispatch(operation).await {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::debug!(breaker = %self.name, error = %err, "operation failed, using fallback");
                fallback().await
            }
        }
    }

    /// Force CLOSED and clear counters
    pub fn reset(&self) {
        self.force(BreakerEvent::ManualReset);
        tracing::info!(breaker = %self.name, "circuit breaker reset");
    }

    /// Force OPEN
    pub fn trip(&self) {
        self.force(BreakerEvent::ManualTrip);
        tracing::warn!(breaker = %self.name, "circuit breaker tripped");
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> BreakerStats {
        let mut inner = self.inner.lock();
        inner.prune_failures(Instant::now(), self.config.monitoring_window);
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failures.len(),
            success_count: inner.probe_successes,
            metrics: inner.metrics.clone(),
            health: health_of(inner.state),
        }
    }

    fn admit(&self) -> bool {
        let mut changes = Vec::new();
        let permitted = {
            let mut inner = self.inner.lock();
            inner.metrics.total_calls += 1;
            if inner.state == BreakerState::Open
                && inner.open_timeout_elapsed(Instant::now(), self.config.open_timeout)
            {
                self.apply(&mut inner, BreakerEvent::OpenTimeoutElapsed, &mut changes);
            }
            if inner.state == BreakerState::Open {
                inner.metrics.rejected_calls += 1;
                false
            } else {
                true
            }
        };
        self.notify(changes);

        if !permitted {
            tracing::debug!(breaker = %self.name, "call rejected, circuit open");
            metrics::counter!("bulwark_breaker_rejected_total", "breaker" => self.name.clone())
                .increment(1);
        }
        permitted
    }

    async fn dispatch<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        let started = Instant::now();
        let result = operation().await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(err) if self.is_excluded(err) => Outcome::Excluded,
            Err(_) => Outcome::Failure,
        };
        self.record(outcome, started.elapsed());
        result
    }

    fn is_excluded(&self, err: &(dyn StdError + 'static)) -> bool {
        let exclusions = self.exclusions.read();
        if exclusions.is_empty() {
            return false;
        }
        std::iter::successors(Some(err), |&e| e.source())
            .any(|e| exclusions.iter().any(|excluded| excluded(e)))
    }

    fn record(&self, outcome: Outcome, elapsed: Duration) {
        let mut changes = Vec::new();
        {
            let mut inner = self.inner.lock();
            let now = Instant::now();

            if elapsed >= self.config.slow_call_threshold {
                inner.metrics.slow_calls += 1;
                tracing::debug!(breaker = %self.name, elapsed = ?elapsed, "slow call");
            }

            match outcome {
                Outcome::Success => {
                    inner.metrics.successful_calls += 1;
                    inner.metrics.last_success_at = Some(Utc::now());
                    if inner.state == BreakerState::HalfOpen {
                        inner.probe_successes += 1;
                        if inner.probe_successes >= self.config.success_threshold {
                            self.apply(&mut inner, BreakerEvent::SuccessThresholdReached, &mut changes);
                        }
                    }
                }
                Outcome::Failure => {
                    inner.metrics.failed_calls += 1;
                    inner.metrics.last_failure_at = Some(Utc::now());
                    match inner.state {
                        BreakerState::HalfOpen => {
                            self.apply(&mut inner, BreakerEvent::ProbeFailed, &mut changes);
                        }
                        BreakerState::Closed => {
                            inner.failures.push_back(now);
                            inner.prune_failures(now, self.config.monitoring_window);
                            let threshold = self.config.failure_threshold as usize;
                            if inner.failures.len() >= threshold {
                                self.apply(&mut inner, BreakerEvent::FailureThresholdReached, &mut changes);
                            }
                        }
                        // Admitted before a concurrent trip; counted only
                        BreakerState::Open => {}
                    }
                }
                Outcome::Excluded => inner.metrics.excluded_failures += 1,
            }
        }
        self.notify(changes);
    }

    fn force(&self, event: BreakerEvent) {
        let mut changes = Vec::new();
        {
            let mut inner = self.inner.lock();
            self.apply(&mut inner, event, &mut changes);
        }
        self.notify(changes);
    }

    /// Apply `event`, resetting the per-state counters on every accepted
    /// transition (including manual self-transitions)
    fn apply(&self, inner: &mut Inner, event: BreakerEvent, changes: &mut Vec<StateChange>) {
        let Some(next) = transition(inner.state, event) else {
            return;
        };

        inner.failures.clear();
        inner.probe_successes = 0;
        inner.opened_at = (next == BreakerState::Open).then(Instant::now);

        if next == inner.state {
            return;
        }

        let at = Utc::now();
        changes.push(StateChange {
            breaker: self.name.clone(),
            from: inner.state,
            to: next,
            at,
        });
        inner.state = next;
        inner.metrics.state_changes += 1;
        inner.metrics.last_state_change_at = Some(at);
    }

    fn notify(&self, changes: Vec<StateChange>) {
        if changes.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for change in changes {
            tracing::info!(
                breaker = %change.breaker,
                from = %change.from,
                to = %change.to,
                "circuit breaker state changed"
            );
            metrics::gauge!("bulwark_breaker_state", "breaker" => self.name.clone())
                .set(state_gauge(change.to));
            for listener in &listeners {
                call_listener(&self.name, || listener(&change));
            }
        }
    }
}

fn health_of(state: BreakerState) -> Health {
    match state {
        BreakerState::Closed => Health::Healthy,
        BreakerState::HalfOpen => Health::Degraded,
        BreakerState::Open => Health::Critical,
    }
}

fn state_gauge(state: BreakerState) -> f64 {
    match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("not found")]
    struct NotFound;

    #[derive(Debug, thiserror::Error)]
    #[error("lookup failed")]
    struct Lookup(#[source] NotFound);

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker
            .execute(|| async { Err::<(), _>(io::Error::other("down")) })
            .await;
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<io::Error>> {
        breaker.execute(|| async { Ok::<_, io::Error>(7) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_recovers() {
        let breaker = CircuitBreaker::new(
            "db",
            BreakerConfig::new()
                .with_failure_threshold(3)
                .with_success_threshold(1)
                .with_open_timeout(Duration::from_secs(5)),
        );

        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let calls = AtomicUsize::new(0);
        let rejected = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, io::Error>(())
            })
            .await;
        assert!(matches!(rejected, Err(BreakerError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(breaker.is_call_permitted());
        assert_eq!(succeed(&breaker).await.ok(), Some(7));
        assert_eq!(breaker.state(), BreakerState::Closed);

        let stats = breaker.stats();
        assert_eq!(stats.metrics.rejected_calls, 1);
        assert_eq!(stats.metrics.state_changes, 3);
        assert_eq!(stats.health, Health::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_reopens() {
        let breaker = CircuitBreaker::new(
            "api",
            BreakerConfig::new()
                .with_failure_threshold(1)
                .with_success_threshold(2)
                .with_open_timeout(Duration::from_secs(1)),
        );
        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(1)).await;

        assert!(succeed(&breaker).await.is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert_eq!(breaker.stats().health, Health::Degraded);

        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.is_call_permitted());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_outside_window_are_forgotten() {
        let breaker = CircuitBreaker::new(
            "cache",
            BreakerConfig::new()
                .with_failure_threshold(2)
                .with_monitoring_window(Duration::from_secs(10)),
        );
        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(11)).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.stats().failure_count, 1);
    }

    #[tokio::test]
    async fn excluded_errors_are_not_counted() {
        let breaker = CircuitBreaker::new("store", BreakerConfig::new().with_failure_threshold(1));
        breaker.exclude::<NotFound>();

        let result = breaker.execute(|| async { Err::<(), _>(NotFound) }).await;
        assert!(matches!(result, Err(BreakerError::Operation(NotFound))));
        assert_eq!(breaker.state(), BreakerState::Closed);

        let stats = breaker.stats();
        assert_eq!(stats.metrics.excluded_failures, 1);
        assert_eq!(stats.metrics.failed_calls, 0);
    }

    #[tokio::test]
    async fn excluded_error_found_in_source_chain() {
        let breaker = CircuitBreaker::new("store", BreakerConfig::new().with_failure_threshold(1));
        breaker.exclude::<NotFound>();

        let result = breaker.execute(|| async { Err::<(), _>(Lookup(NotFound)) }).await;
        assert!(matches!(result, Err(BreakerError::Operation(Lookup(NotFound)))));
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.stats().metrics.excluded_failures, 1);
    }

    #[tokio::test]
    async fn fallback_on_rejection_and_failure() {
        let breaker = CircuitBreaker::new("quotes", BreakerConfig::new().with_failure_threshold(1));

        let value = breaker
            .execute_with_fallback(
                || async { Err::<u32, _>(io::Error::other("down")) },
                || async { Ok(0) },
            )
            .await;
        assert_eq!(value.ok(), Some(0));
        assert_eq!(breaker.state(), BreakerState::Open);

        let value = breaker
            .execute_with_fallback(|| async { Ok::<u32, io::Error>(1) }, || async { Ok(2) })
            .await;
        assert_eq!(value.ok(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_are_tracked_not_failed() {
        let breaker = CircuitBreaker::new(
            "slow",
            BreakerConfig::new().with_slow_call_threshold(Duration::from_secs(1)),
        );
        let result = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok::<_, io::Error>(())
            })
            .await;
        assert!(result.is_ok());

        let stats = breaker.stats();
        assert_eq!(stats.metrics.slow_calls, 1);
        assert_eq!(stats.metrics.successful_calls, 1);
        assert_eq!(stats.state, BreakerState::Closed);
    }

    #[tokio::test]
    async fn listeners_see_changes_and_panics_are_contained() {
        let breaker = CircuitBreaker::new("events", BreakerConfig::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        breaker.on_state_change(|_| panic!("listener bug"));
        breaker.on_state_change(move |change| sink.lock().push((change.from, change.to)));

        breaker.trip();
        breaker.reset();

        assert_eq!(
            *seen.lock(),
            vec![
                (BreakerState::Closed, BreakerState::Open),
                (BreakerState::Open, BreakerState::Closed)
            ]
        );
    }

    #[tokio::test]
    async fn reset_clears_counters() {
        let breaker = CircuitBreaker::new("counters", BreakerConfig::new());
        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.stats().failure_count, 2);

        breaker.reset();
        assert_eq!(breaker.stats().failure_count, 0);
        assert_eq!(breaker.stats().metrics.state_changes, 0);
    }
}
