//! Automatic stop conditions

use crate::scope::{StopReason, StopScope};
use bulwark_kernel::{Handler, SharedHandler};
use std::fmt;
use std::sync::Arc;

/// Predicate polled by the monitoring loop
///
/// The first enabled condition returning `true` triggers a stop with
/// its reason, scope and targets.
#[derive(Clone)]
pub struct StopCondition {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) check: SharedHandler<(), bool>,
    pub(crate) reason: StopReason,
    pub(crate) scope: StopScope,
    pub(crate) targets: Option<Vec<String>>,
    pub(crate) enabled: bool,
}

impl fmt::Debug for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopCondition")
            .field("name", &self.name)
            .field("reason", &self.reason)
            .field("scope", &self.scope)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl StopCondition {
    /// Create enabled condition
    pub fn new<C>(name: impl Into<String>, reason: StopReason, scope: StopScope, check: C) -> Self
    where
        C: Handler<(), bool> + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            check: Arc::new(check),
            reason,
            scope,
            targets: None,
            enabled: true,
        }
    }

    /// Set description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set component, subsystem or service names the stop targets
    #[must_use]
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = Some(targets.into_iter().map(Into::into).collect());
        self
    }

    /// Start disabled
    #[inline]
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Condition name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Reason recorded when the condition fires
    #[inline]
    #[must_use]
    pub fn reason(&self) -> StopReason {
        self.reason
    }

    /// Scope of the triggered stop
    #[inline]
    #[must_use]
    pub fn scope(&self) -> StopScope {
        self.scope
    }

    /// Check if the monitor polls this condition
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
