//! Level actions

use crate::event::EventId;
use crate::level::EscalationLevel;
use bulwark_kernel::SharedHandler;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Input passed to an action handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionContext {
    /// Event that reached the level
    pub event_id: EventId,
    /// Level whose actions are running
    pub level: EscalationLevel,
    /// Reason given for the transition
    pub reason: String,
    /// Channels the action should notify
    pub notification_channels: Vec<String>,
}

/// Handler run when the ladder reaches an action's level
pub type ActionHandler = SharedHandler<ActionContext, ()>;

/// Side effect attached to one level
#[derive(Clone)]
pub struct EscalationAction {
    /// Level this action belongs to
    pub level: EscalationLevel,
    /// Action name, used in logs and failure reports
    pub name: String,
    /// Human description
    pub description: String,
    /// Optional handler; actions without one are declarative only
    pub handler: Option<ActionHandler>,
    /// Auto-escalate one level if still unacknowledged after this long
    pub auto_escalate_after: Option<Duration>,
    /// Whether reaching this level requires acknowledgment
    pub requires_acknowledgment: bool,
    /// Where notifications go
    pub notification_channels: Vec<String>,
    /// Per-invocation timeout for the handler
    pub timeout: Option<Duration>,
}

impl fmt::Debug for EscalationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscalationAction")
            .field("level", &self.level)
            .field("name", &self.name)
            .field("has_handler", &self.handler.is_some())
            .field("auto_escalate_after", &self.auto_escalate_after)
            .field("requires_acknowledgment", &self.requires_acknowledgment)
            .field("notification_channels", &self.notification_channels)
            .finish_non_exhaustive()
    }
}

impl EscalationAction {
    /// Create action with no handler
    #[must_use]
    pub fn new(level: EscalationLevel, name: impl Into<String>) -> Self {
        Self {
            level,
            name: name.into(),
            description: String::new(),
            handler: None,
            auto_escalate_after: None,
            requires_acknowledgment: false,
            notification_channels: Vec::new(),
            timeout: None,
        }
    }

    /// Set description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach a handler
    #[must_use]
    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: bulwark_kernel::Handler<ActionContext, ()> + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Require acknowledgment when this level is reached
    #[inline]
    #[must_use]
    pub fn requiring_acknowledgment(mut self) -> Self {
        self.requires_acknowledgment = true;
        self
    }

    /// Auto-escalate after `after` without acknowledgment
    #[inline]
    #[must_use]
    pub fn with_auto_escalate_after(mut self, after: Duration) -> Self {
        self.auto_escalate_after = Some(after);
        self
    }

    /// Set notification channels
    #[must_use]
    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notification_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Bound each handler invocation
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Built-in actions for levels 1 through 5
#[must_use]
pub fn default_actions() -> Vec<EscalationAction> {
    vec![
        EscalationAction::new(EscalationLevel::Warning, "increase_monitoring")
            .with_description("Increase monitoring frequency and logging")
            .with_channels(["logs"]),
        EscalationAction::new(EscalationLevel::Alert, "notify_team")
            .with_description("Send alert to engineering team")
            .with_channels(["slack", "email"]),
        EscalationAction::new(EscalationLevel::Critical, "page_oncall")
            .with_description("Page on-call engineer")
            .requiring_acknowledgment()
            .with_auto_escalate_after(Duration::from_secs(300))
            .with_channels(["pagerduty", "phone"]),
        EscalationAction::new(EscalationLevel::Emergency, "stop_non_critical")
            .with_description("Stop all non-critical operations")
            .requiring_acknowledgment()
            .with_channels(["all"]),
        EscalationAction::new(EscalationLevel::Disaster, "full_shutdown")
            .with_description("Full system shutdown")
            .requiring_acknowledgment()
            .with_channels(["all", "executive"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_levels_one_to_five() {
        let actions = default_actions();
        let levels: Vec<u8> = actions.iter().map(|a| a.level.value()).collect();
        assert_eq!(levels, vec![1, 2, 3, 4, 5]);

        let page = &actions[2];
        assert!(page.requires_acknowledgment);
        assert_eq!(page.auto_escalate_after, Some(Duration::from_secs(300)));
        assert!(!actions[0].requires_acknowledgment);
        assert!(actions.iter().all(|a| a.handler.is_none()));
    }
}
