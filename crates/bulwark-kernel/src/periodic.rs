//! Cancellable fixed-interval loop
//!
//! Used by the emergency-stop condition monitor, the escalation supervisor
//! and the metric collector. Cancellation is cooperative: a stop request
//! is observed between iterations, so an in-flight tick always finishes.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What the loop should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    /// Sleep for the interval and tick again
    Continue,
    /// End the loop
    Break,
}

/// Handle to a running periodic loop
///
/// Dropping the handle also cancels the loop.
#[derive(Debug)]
pub struct LoopHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    /// Loop name (used in logs)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the loop has ended
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request cancellation without waiting
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Request cancellation and wait for the in-flight tick to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(loop_name = %self.name, error = %e, "periodic loop ended abnormally");
        }
    }
}

/// Spawn a loop that calls `tick` immediately and then every `interval`
pub fn spawn_periodic<F, Fut>(name: impl Into<String>, interval: Duration, mut tick: F) -> LoopHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = LoopControl> + Send + 'static,
{
    let name = name.into();
    let (shutdown, mut rx) = watch::channel(false);
    let loop_name = name.clone();

    let task = tokio::spawn(async move {
        tracing::debug!(loop_name = %loop_name, ?interval, "periodic loop started");
        loop {
            if *rx.borrow() {
                break;
            }
            if tick().await == LoopControl::Break {
                break;
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        break;
                    }
                }
                () = tokio::time::sleep(interval) => {}
            }
        }
        tracing::debug!(loop_name = %loop_name, "periodic loop stopped");
    });

    LoopHandle {
        name,
        shutdown,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn ticks_on_interval_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let handle = spawn_periodic("test", Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                LoopControl::Continue
            }
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.stop().await;

        // t = 0, 1, 2, 3
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_can_break_the_loop() {
        let handle = spawn_periodic("once", Duration::from_secs(1), || async {
            LoopControl::Break
        });
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_tick_finishes_before_stop() {
        let done = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&done);
        let handle = spawn_periodic("slow", Duration::from_secs(10), move || {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                flag.fetch_add(1, Ordering::SeqCst);
                LoopControl::Continue
            }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.stop().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
