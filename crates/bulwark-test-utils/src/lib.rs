//! Testing utilities for Bulwark workspace
//!
//! Shared fixtures: in-memory stateful components, call counters and
//! recording handlers.

#![allow(missing_docs)]

use bulwark_kernel::{Handler, HandlerError, HandlerResult};
use futures::future;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Component whose state is a JSON value held in memory
#[derive(Debug, Clone)]
pub struct StateCell {
    name: String,
    state: Arc<Mutex<Value>>,
    saves: Arc<AtomicUsize>,
    restores: Arc<AtomicUsize>,
    fail_save: Arc<AtomicBool>,
    fail_restore: Arc<AtomicBool>,
}

impl StateCell {
    pub fn new(name: &str, initial: Value) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(initial)),
            saves: Arc::default(),
            restores: Arc::default(),
            fail_save: Arc::default(),
            fail_restore: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> Value {
        self.state.lock().clone()
    }

    pub fn set(&self, value: Value) {
        *self.state.lock() = value;
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn fail_restores(&self, fail: bool) {
        self.fail_restore.store(fail, Ordering::SeqCst);
    }

    pub fn save_handler(&self) -> impl Handler<(), Value> + 'static {
        let cell = self.clone();
        move |(): ()| {
            cell.saves.fetch_add(1, Ordering::SeqCst);
            let result = if cell.fail_save.load(Ordering::SeqCst) {
                Err(HandlerError::failed(format!("{} save failed", cell.name)))
            } else {
                Ok(cell.get())
            };
            future::ready(result)
        }
    }

    pub fn restore_handler(&self) -> impl Handler<Value, ()> + 'static {
        let cell = self.clone();
        move |value: Value| {
            cell.restores.fetch_add(1, Ordering::SeqCst);
            let result = if cell.fail_restore.load(Ordering::SeqCst) {
                Err(HandlerError::failed(format!("{} restore failed", cell.name)))
            } else {
                cell.set(value);
                Ok(())
            };
            future::ready(result)
        }
    }
}

/// Counts handler invocations; can be switched to failing
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let counter = Self::default();
        counter.set_failing(true);
        counter
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn handler<I>(&self) -> impl Handler<I, ()> + 'static
    where
        I: 'static,
    {
        let counter = self.clone();
        move |_input: I| {
            counter.calls.fetch_add(1, Ordering::SeqCst);
            let result: HandlerResult<()> = if counter.failing.load(Ordering::SeqCst) {
                Err(HandlerError::failed("counter set to fail"))
            } else {
                Ok(())
            };
            future::ready(result)
        }
    }
}

/// Records every value it receives
#[derive(Debug)]
pub struct Recorder<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Async handler that records its input
    pub fn handler(&self) -> impl Handler<T, ()> + 'static {
        let items = Arc::clone(&self.items);
        move |item: T| {
            items.lock().push(item);
            future::ready(Ok(()))
        }
    }

    /// Synchronous listener that records a clone of its argument
    pub fn listener(&self) -> impl Fn(&T) + Send + Sync + 'static {
        let items = Arc::clone(&self.items);
        move |item: &T| items.lock().push(item.clone())
    }
}

/// Install a test-writer tracing subscriber once per process
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
