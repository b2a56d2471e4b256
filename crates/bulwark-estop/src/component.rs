//! Stoppable components

use bulwark_kernel::{Handler, SharedHandler};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Stop or recovery handler
pub type StopHandler = SharedHandler<(), ()>;

/// A component the emergency stop can halt
#[derive(Clone)]
pub struct StoppableComponent {
    pub(crate) name: String,
    pub(crate) stop: StopHandler,
    pub(crate) recover: Option<StopHandler>,
    pub(crate) subsystem: Option<String>,
    pub(crate) service: Option<String>,
    pub(crate) timeout: Option<Duration>,
}

impl fmt::Debug for StoppableComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoppableComponent")
            .field("name", &self.name)
            .field("subsystem", &self.subsystem)
            .field("service", &self.service)
            .field("recoverable", &self.recover.is_some())
            .finish_non_exhaustive()
    }
}

impl StoppableComponent {
    /// Create component from its stop handler
    pub fn new<S>(name: impl Into<String>, stop: S) -> Self
    where
        S: Handler<(), ()> + 'static,
    {
        Self {
            name: name.into(),
            stop: Arc::new(stop),
            recover: None,
            subsystem: None,
            service: None,
            timeout: None,
        }
    }

    /// Attach a recovery handler
    #[must_use]
    pub fn with_recovery<R>(mut self, recover: R) -> Self
    where
        R: Handler<(), ()> + 'static,
    {
        self.recover = Some(Arc::new(recover));
        self
    }

    /// Label the component with a subsystem
    #[inline]
    #[must_use]
    pub fn in_subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = Some(subsystem.into());
        self
    }

    /// Label the component with a service
    #[inline]
    #[must_use]
    pub fn in_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Override the handler timeout for this component
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

    /// Subsystem label
    #[inline]
    #[must_use]
    pub fn subsystem(&self) -> Option<&str> {
        self.subsystem.as_deref()
    }

    /// Service label
    #[inline]
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Check if the component can be recovered
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.recover.is_some()
    }
}
