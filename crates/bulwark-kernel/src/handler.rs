//! Capability interface for externally supplied hooks
//!
//! Any `Fn(I) -> impl Future<Output = HandlerResult<O>>` closure is a
//! [`Handler`]; synchronous closures are adapted with [`sync_handler`].
//! The control plane never calls a handler directly: it goes through
//! [`invoke`], so a failing, hanging or panicking hook becomes a
//! [`HandlerError`] value instead of unwinding through bookkeeping code.

use crate::error::HandlerError;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Result returned by every handler
pub type HandlerResult<O> = Result<O, HandlerError>;

/// Shared, type-erased handler
pub type SharedHandler<I, O> = Arc<dyn Handler<I, O>>;

/// Single-method capability implemented per concrete action
pub trait Handler<I, O>: Send + Sync {
    /// Run the handler
    fn call(&self, input: I) -> BoxFuture<'_, HandlerResult<O>>;
}

impl<I, O, F, Fut> Handler<I, O> for F
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<O>> + Send + 'static,
{
    fn call(&self, input: I) -> BoxFuture<'_, HandlerResult<O>> {
        Box::pin(self(input))
    }
}

/// Adapt a synchronous closure into a [`Handler`]
pub fn sync_handler<I, O, F>(f: F) -> impl Handler<I, O>
where
    F: Fn(I) -> HandlerResult<O> + Send + Sync,
    O: Send + 'static,
{
    move |input: I| future::ready(f(input))
}

/// Invoke a handler with optional timeout and panic capture
///
/// # Errors
/// - `HandlerError::Failed` if the handler returned an error
/// - `HandlerError::TimedOut` if `timeout` elapsed first
/// - `HandlerError::Panicked` if the handler panicked
pub async fn invoke<I, O, H>(handler: &H, input: I, timeout: Option<Duration>) -> HandlerResult<O>
where
    H: Handler<I, O> + ?Sized,
{
    // The closure body may panic before it yields a future
    let call = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(input))) {
        Ok(call) => call,
        Err(payload) => return Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    };

    let guarded = AssertUnwindSafe(call).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(HandlerError::TimedOut(limit)),
        },
        None => guarded.await,
    };

    match outcome {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Run a synchronous listener, logging instead of unwinding on panic
///
/// Returns `false` if the listener panicked.
pub fn call_listener<F: FnOnce()>(label: &str, listener: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(listener)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::warn!(
                listener = label,
                panic = %panic_message(payload.as_ref()),
                "listener panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invoke_async_closure() {
        let handler = |x: u32| async move { Ok(x + 1) };
        assert_eq!(invoke(&handler, 1, None).await, Ok(2));
    }

    #[tokio::test]
    async fn invoke_sync_handler() {
        let handler = sync_handler(|s: &'static str| Ok(s.len()));
        assert_eq!(invoke(&handler, "four", None).await, Ok(4));
    }

    #[tokio::test]
    async fn invoke_propagates_failure() {
        let handler = sync_handler(|(): ()| -> HandlerResult<()> { Err("nope".into()) });
        assert_eq!(
            invoke(&handler, (), None).await,
            Err(HandlerError::Failed("nope".to_string()))
        );
    }

    #[tokio::test]
    async fn invoke_captures_panic() {
        let handler = sync_handler(|(): ()| -> HandlerResult<()> { panic!("kaboom") });
        let result = invoke(&handler, (), None).await;
        assert_eq!(result, Err(HandlerError::Panicked("kaboom".to_string())));
    }

    #[tokio::test]
    async fn invoke_captures_async_panic() {
        let handler = |(): ()| async move {
            if true {
                panic!("late");
            }
            Ok(())
        };
        let result: HandlerResult<()> = invoke(&handler, (), None).await;
        assert!(matches!(result, Err(HandlerError::Panicked(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_times_out() {
        let handler = |(): ()| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        };
        let result: HandlerResult<()> =
            invoke(&handler, (), Some(Duration::from_secs(1))).await;
        assert_eq!(result, Err(HandlerError::TimedOut(Duration::from_secs(1))));
    }

    #[tokio::test]
    async fn invoke_through_shared_handler() {
        let shared: SharedHandler<u8, u8> = Arc::new(sync_handler(|x: u8| Ok(x * 3)));
        assert_eq!(invoke(shared.as_ref(), 3, None).await, Ok(9));
    }

    #[test]
    fn listener_panic_is_contained() {
        assert!(call_listener("ok", || {}));
        assert!(!call_listener("bad", || panic!("listener bug")));
    }
}
