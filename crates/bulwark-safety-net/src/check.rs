//! Safety checks and their results

use crate::layer::SafetyLayer;
use bulwark_kernel::{sync_handler, Handler, HandlerError, SharedHandler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether a payload passes
pub type CheckPredicate<T> = SharedHandler<Arc<T>, bool>;

/// Callback run when a predicate returns `false`
pub type FailureCallback<T> = SharedHandler<Arc<T>, ()>;

/// One check in the pipeline
pub struct SafetyCheck<T> {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) layer: SafetyLayer,
    pub(crate) predicate: CheckPredicate<T>,
    pub(crate) on_failure: Option<FailureCallback<T>>,
    pub(crate) enabled: bool,
    pub(crate) blocking: bool,
    pub(crate) priority: i32,
}

impl<T> Clone for SafetyCheck<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            layer: self.layer,
            predicate: Arc::clone(&self.predicate),
            on_failure: self.on_failure.clone(),
            enabled: self.enabled,
            blocking: self.blocking,
            priority: self.priority,
        }
    }
}

impl<T> fmt::Debug for SafetyCheck<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyCheck")
            .field("name", &self.name)
            .field("layer", &self.layer)
            .field("enabled", &self.enabled)
            .field("blocking", &self.blocking)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> SafetyCheck<T> {
    /// Create enabled, blocking check with priority 0
    pub fn new<P>(name: impl Into<String>, layer: SafetyLayer, predicate: P) -> Self
    where
        P: Handler<Arc<T>, bool> + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            layer,
            predicate: Arc::new(predicate),
            on_failure: None,
            enabled: true,
            blocking: true,
            priority: 0,
        }
    }

    /// Create check from an infallible synchronous predicate
    pub fn from_fn<F>(name: impl Into<String>, layer: SafetyLayer, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::new(name, layer, sync_handler(move |data: Arc<T>| Ok(predicate(&data))))
    }

    /// Set description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set priority; lower runs first within the layer
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Record failures without blocking the operation
    #[inline]
    #[must_use]
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    /// Start disabled
    #[inline]
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Run `callback` whenever the predicate returns `false`
    #[must_use]
    pub fn on_failure<C>(mut self, callback: C) -> Self
    where
        C: Handler<Arc<T>, ()> + 'static,
    {
        self.on_failure = Some(Arc::new(callback));
        self
    }
}

impl<T> SafetyCheck<T> {
    /// Check name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layer the check runs in
    #[inline]
    #[must_use]
    pub fn layer(&self) -> SafetyLayer {
        self.layer
    }

    /// Whether a failure blocks the operation
    #[inline]
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Serializable description of the check
    #[must_use]
    pub fn info(&self) -> CheckInfo {
        CheckInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            layer: self.layer,
            enabled: self.enabled,
            blocking: self.blocking,
            priority: self.priority,
        }
    }
}

/// Registered check, as listed by `list_checks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInfo {
    /// Check name
    pub name: String,
    /// Description
    pub description: String,
    /// Layer
    pub layer: SafetyLayer,
    /// Whether the check runs
    pub enabled: bool,
    /// Whether a failure blocks the operation
    pub blocking: bool,
    /// Order within the layer
    pub priority: i32,
}

/// Outcome of one check in one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check name
    pub check: String,
    /// Layer
    pub layer: SafetyLayer,
    /// Whether the payload passed
    pub passed: bool,
    /// Whether a failure blocks the operation
    pub blocking: bool,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Predicate error, panic or timeout (the check counts as failed)
    pub error: Option<HandlerError>,
}

impl CheckResult {
    /// Check if this result blocks the operation
    #[inline]
    #[must_use]
    pub fn blocks(&self) -> bool {
        self.blocking && !self.passed
    }
}
