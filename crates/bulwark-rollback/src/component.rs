//! Rollback component handlers

use bulwark_kernel::{Handler, SharedHandler};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Opaque captured state of one component
pub type ComponentState = serde_json::Value;

/// Input to a compensate handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compensation {
    /// State the component is in now
    pub current: ComponentState,
    /// State it should end up in
    pub target: ComponentState,
}

/// A component that can be captured and restored
#[derive(Clone)]
pub struct RollbackComponent {
    pub(crate) name: String,
    pub(crate) save: SharedHandler<(), ComponentState>,
    pub(crate) restore: SharedHandler<ComponentState, ()>,
    pub(crate) compensate: Option<SharedHandler<Compensation, ()>>,
    pub(crate) timeout: Option<Duration>,
}

impl fmt::Debug for RollbackComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackComponent")
            .field("name", &self.name)
            .field("compensates", &self.compensate.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RollbackComponent {
    /// Create component from save and restore handlers
    pub fn new<S, R>(name: impl Into<String>, save: S, restore: R) -> Self
    where
        S: Handler<(), ComponentState> + 'static,
        R: Handler<ComponentState, ()> + 'static,
    {
        Self {
            name: name.into(),
            save: Arc::new(save),
            restore: Arc::new(restore),
            compensate: None,
            timeout: None,
        }
    }

    /// Attach a compensate handler
    #[must_use]
    pub fn with_compensate<C>(mut self, compensate: C) -> Self
    where
        C: Handler<Compensation, ()> + 'static,
    {
        self.compensate = Some(Arc::new(compensate));
        self
    }

    /// Bound every handler call for this component
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Component name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if a compensate handler is registered
    #[inline]
    #[must_use]
    pub fn compensates(&self) -> bool {
        self.compensate.is_some()
    }
}
