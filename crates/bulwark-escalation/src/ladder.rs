//! Escalation ladder
//!
//! Level transitions are committed under one bookkeeping lock, which
//! gives every accepted transition a place in a total order. Level
//! actions and listeners run after the lock is released.

use crate::action::{default_actions, ActionContext, EscalationAction};
use crate::config::LadderConfig;
use crate::error::EscalationError;
use crate::event::{EscalationEvent, EventId};
use crate::level::{next_level, EscalationLevel, LadderMove};
use bulwark_kernel::{call_listener, invoke, spawn_periodic, ComponentFailure, Health, LoopControl, LoopHandle};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Actor recorded for timeout-driven escalations
pub const AUTO_ESCALATION_ACTOR: &str = "auto-escalation";

/// Actor recorded for stability-driven de-escalations
pub const AUTO_DE_ESCALATION_ACTOR: &str = "auto-de-escalation";

/// Result of a ladder operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationOutcome {
    /// Accepted event, or `None` if the level did not change
    pub event: Option<EscalationEvent>,
    /// Level after the operation
    pub level: EscalationLevel,
    /// Actions whose handlers failed
    pub action_failures: Vec<ComponentFailure>,
    /// Whether the event was queued for acknowledgment
    pub pending_acknowledgment: bool,
}

impl EscalationOutcome {
    fn unchanged(level: EscalationLevel) -> Self {
        Self {
            event: None,
            level,
            action_failures: Vec::new(),
            pending_acknowledgment: false,
        }
    }

    /// Check if the level changed
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        self.event.is_some()
    }
}

/// Ladder status for dashboards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderStatus {
    /// Ladder name
    pub name: String,
    /// Current level
    pub level: EscalationLevel,
    /// Current level name
    pub level_name: String,
    /// Current level value
    pub level_value: u8,
    /// Events awaiting acknowledgment
    pub pending_acknowledgments: usize,
    /// Accepted transitions since construction
    pub history_count: u64,
    /// Last five events, oldest first
    pub recent_events: Vec<EscalationEvent>,
    /// Health classification
    pub health: Health,
}

type Listener = Arc<dyn Fn(&EscalationEvent) + Send + Sync>;

#[derive(Debug)]
struct PendingAck {
    event: EscalationEvent,
    queued_at: Instant,
    auto_escalated: bool,
}

#[derive(Debug)]
struct LadderState {
    level: EscalationLevel,
    history: VecDeque<EscalationEvent>,
    total_events: u64,
    pending: Vec<PendingAck>,
    escalation_times: VecDeque<Instant>,
    last_transition: Instant,
}

struct Committed {
    event: EscalationEvent,
    upward: bool,
    needs_ack: bool,
}

/// Graduated incident-severity state machine
pub struct EscalationLadder {
    config: LadderConfig,
    state: Mutex<LadderState>,
    actions: RwLock<BTreeMap<EscalationLevel, Vec<EscalationAction>>>,
    listeners: RwLock<Vec<Listener>>,
}

impl fmt::Debug for EscalationLadder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscalationLadder")
            .field("name", &self.config.name)
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

impl EscalationLadder {
    /// Create ladder at the configured initial level
    #[must_use]
    pub fn new(config: LadderConfig) -> Self {
        let mut actions: BTreeMap<EscalationLevel, Vec<EscalationAction>> = BTreeMap::new();
        if config.register_defaults {
            for action in default_actions() {
                actions.entry(action.level).or_default().push(action);
            }
        }

        Self {
            state: Mutex::new(LadderState {
                level: config.initial_level,
                history: VecDeque::new(),
                total_events: 0,
                pending: Vec::new(),
                escalation_times: VecDeque::new(),
                last_transition: Instant::now(),
            }),
            actions: RwLock::new(actions),
            listeners: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Ladder configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &LadderConfig {
        &self.config
    }

    /// Current level
    #[must_use]
    pub fn level(&self) -> EscalationLevel {
        self.state.lock().level
    }

    /// Retained history, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<EscalationEvent> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Events waiting for acknowledgment
    #[must_use]
    pub fn pending_acknowledgments(&self) -> Vec<EscalationEvent> {
        self.state
            .lock()
            .pending
            .iter()
            .map(|p| p.event.clone())
            .collect()
    }

    /// Attach an action to its level
    pub fn register_action(&self, action: EscalationAction) {
        tracing::debug!(ladder = %self.config.name, action = %action.name, level = %action.level, "registered escalation action");
        self.actions.write().entry(action.level).or_default().push(action);
    }

    /// Actions registered for `level`
    #[must_use]
    pub fn actions_for(&self, level: EscalationLevel) -> Vec<EscalationAction> {
        self.actions.read().get(&level).cloned().unwrap_or_default()
    }

    /// Register a listener for accepted events
    pub fn on_event<L>(&self, listener: L)
    where
        L: Fn(&EscalationEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Raise the level by `levels`, clamped at the maximum
    ///
    /// # Errors
    /// `EscalationError::RateLimited` if the rate window is full.
    pub async fn escalate(
        &self,
        reason: &str,
        triggered_by: &str,
        levels: u8,
    ) -> Result<EscalationOutcome, EscalationError> {
        let (committed, level) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            self.check_rate(&mut state, now)?;
            let target = next_level(state.level, LadderMove::Up(levels));
            (self.commit(&mut state, target, reason, triggered_by, now), state.level)
        };
        Ok(self.finish(committed, level).await)
    }

    /// Lower the level by `levels`, clamped at the minimum
    ///
    /// De-escalation is never rate limited and never needs acknowledgment.
    pub async fn de_escalate(&self, reason: &str, triggered_by: &str, levels: u8) -> EscalationOutcome {
        let (committed, level) = {
            let mut state = self.state.lock();
            let target = next_level(state.level, LadderMove::Down(levels));
            (self.commit(&mut state, target, reason, triggered_by, Instant::now()), state.level)
        };
        self.finish(committed, level).await
    }

    /// Jump directly to `level`
    ///
    /// # Errors
    /// `EscalationError::RateLimited` if this raises the level and the
    /// rate window is full.
    pub async fn set_level(
        &self,
        level: EscalationLevel,
        reason: &str,
        triggered_by: &str,
    ) -> Result<EscalationOutcome, EscalationError> {
        let (committed, current) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let target = next_level(state.level, LadderMove::Jump(level));
            if target > state.level {
                self.check_rate(&mut state, now)?;
            }
            (self.commit(&mut state, target, reason, triggered_by, now), state.level)
        };
        Ok(self.finish(committed, current).await)
    }

    /// Acknowledge a pending event
    ///
    /// # Errors
    /// `EscalationError::NotPending` if no pending event has this id.
    pub fn acknowledge(&self, event_id: EventId, by: &str) -> Result<EscalationEvent, EscalationError> {
        let mut state = self.state.lock();
        let index = state
            .pending
            .iter()
            .position(|p| p.event.id == event_id)
            .ok_or(EscalationError::NotPending(event_id))?;

        let at = Utc::now();
        let mut pending = state.pending.remove(index);
        pending.event.acknowledge(by, at);
        if let Some(recorded) = state.history.iter_mut().find(|e| e.id == event_id) {
            recorded.acknowledge(by, at);
        }
        drop(state);

        tracing::info!(ladder = %self.config.name, event = %event_id, by, "escalation acknowledged");
        Ok(pending.event)
    }

    /// Force the initial level and clear pending acknowledgments
    pub fn reset(&self) {
        let level = {
            let mut state = self.state.lock();
            state.level = self.config.initial_level;
            state.pending.clear();
            state.last_transition = Instant::now();
            state.level
        };
        self.record_level(level);
        tracing::info!(ladder = %self.config.name, %level, "escalation ladder reset");
    }

    /// Auto-escalate the oldest pending event at the current level whose
    /// acknowledgment deadline has passed
    pub async fn check_timeouts(&self) -> Option<EscalationOutcome> {
        let due = {
            let state = self.state.lock();
            let actions = self.actions.read();
            let now = Instant::now();
            state
                .pending
                .iter()
                .filter(|p| !p.auto_escalated && p.event.to_level == state.level)
                .find(|p| {
                    actions
                        .get(&p.event.to_level)
                        .and_then(|list| list.iter().filter_map(|a| a.auto_escalate_after).min())
                        .is_some_and(|after| now.duration_since(p.queued_at) >= after)
                })
                .map(|p| p.event.id)
        }?;

        let reason = format!("event {due} not acknowledged in time");
        match self.escalate(&reason, AUTO_ESCALATION_ACTOR, 1).await {
            Ok(outcome) => {
                if let Some(p) = self.state.lock().pending.iter_mut().find(|p| p.event.id == due) {
                    p.auto_escalated = true;
                }
                Some(outcome)
            }
            Err(err) => {
                tracing::warn!(ladder = %self.config.name, event = %due, error = %err, "auto-escalation deferred");
                None
            }
        }
    }

    /// De-escalate one level if the ladder has been stable long enough
    pub async fn check_stability(&self) -> Option<EscalationOutcome> {
        if !self.config.auto_de_escalate {
            return None;
        }
        let stable_for = {
            let state = self.state.lock();
            if state.level == EscalationLevel::MIN || !state.pending.is_empty() {
                return None;
            }
            state.last_transition.elapsed()
        };
        if stable_for < self.config.de_escalate_after {
            return None;
        }

        let reason = format!("stable for {}s", stable_for.as_secs());
        Some(self.de_escalate(&reason, AUTO_DE_ESCALATION_ACTOR, 1).await)
    }

    /// Run `check_timeouts` and `check_stability` every `interval`
    pub fn supervise(self: &Arc<Self>, interval: Duration) -> LoopHandle {
        let ladder = Arc::clone(self);
        spawn_periodic(
            format!("escalation-supervisor-{}", self.config.name),
            interval,
            move || {
                let ladder = Arc::clone(&ladder);
                async move {
                    ladder.check_timeouts().await;
                    ladder.check_stability().await;
                    LoopControl::Continue
                }
            },
        )
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> LadderStatus {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(5);
        LadderStatus {
            name: self.config.name.clone(),
            level: state.level,
            level_name: state.level.name().to_string(),
            level_value: state.level.value(),
            pending_acknowledgments: state.pending.len(),
            history_count: state.total_events,
            recent_events: state.history.iter().skip(skip).cloned().collect(),
            health: health_of(state.level),
        }
    }

    fn check_rate(&self, state: &mut LadderState, now: Instant) -> Result<(), EscalationError> {
        while let Some(&oldest) = state.escalation_times.front() {
            if now.duration_since(oldest) >= self.config.rate_window {
                state.escalation_times.pop_front();
            } else {
                break;
            }
        }
        if state.escalation_times.len() >= self.config.max_escalation_rate as usize {
            tracing::warn!(
                ladder = %self.config.name,
                limit = self.config.max_escalation_rate,
                "escalation rejected by rate limit"
            );
            return Err(EscalationError::RateLimited {
                limit: self.config.max_escalation_rate,
                window: self.config.rate_window,
            });
        }
        Ok(())
    }

    fn commit(
        &self,
        state: &mut LadderState,
        target: EscalationLevel,
        reason: &str,
        triggered_by: &str,
        now: Instant,
    ) -> Option<Committed> {
        if target == state.level {
            return None;
        }

        let event = EscalationEvent::new(state.level, target, reason, triggered_by);
        let upward = event.is_escalation();
        let needs_ack = upward
            && self
                .actions
                .read()
                .get(&target)
                .is_some_and(|list| list.iter().any(|a| a.requires_acknowledgment));

        state.level = target;
        state.last_transition = now;
        state.total_events += 1;
        state.history.push_back(event.clone());
        while state.history.len() > self.config.history_limit {
            state.history.pop_front();
        }
        if upward {
            state.escalation_times.push_back(now);
        }
        if needs_ack {
            state.pending.push(PendingAck {
                event: event.clone(),
                queued_at: now,
                auto_escalated: false,
            });
        }

        Some(Committed {
            event,
            upward,
            needs_ack,
        })
    }

    async fn finish(&self, committed: Option<Committed>, level: EscalationLevel) -> EscalationOutcome {
        let Some(Committed {
            event,
            upward,
            needs_ack,
        }) = committed
        else {
            return EscalationOutcome::unchanged(level);
        };

        self.record_level(event.to_level);
        if upward {
            tracing::warn!(
                ladder = %self.config.name,
                from = %event.from_level,
                to = %event.to_level,
                reason = %event.reason,
                by = %event.triggered_by,
                "escalated"
            );
        } else {
            tracing::info!(
                ladder = %self.config.name,
                from = %event.from_level,
                to = %event.to_level,
                reason = %event.reason,
                by = %event.triggered_by,
                "de-escalated"
            );
        }

        let action_failures = if upward {
            self.run_actions(&event).await
        } else {
            Vec::new()
        };

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            call_listener(&self.config.name, || listener(&event));
        }

        EscalationOutcome {
            level: event.to_level,
            event: Some(event),
            action_failures,
            pending_acknowledgment: needs_ack,
        }
    }

    async fn run_actions(&self, event: &EscalationEvent) -> Vec<ComponentFailure> {
        let actions = self.actions_for(event.to_level);
        let mut failures = Vec::new();

        for action in actions {
            let Some(handler) = action.handler.as_ref() else {
                continue;
            };
            let context = ActionContext {
                event_id: event.id,
                level: event.to_level,
                reason: event.reason.clone(),
                notification_channels: action.notification_channels.clone(),
            };
            let timeout = action.timeout.or(self.config.action_timeout);
            if let Err(err) = invoke(handler.as_ref(), context, timeout).await {
                tracing::warn!(
                    ladder = %self.config.name,
                    action = %action.name,
                    error = %err,
                    "escalation action failed"
                );
                failures.push(ComponentFailure::new(action.name.clone(), err));
            }
        }
        failures
    }

    fn record_level(&self, level: EscalationLevel) {
        metrics::gauge!("bulwark_escalation_level", "ladder" => self.config.name.clone())
            .set(f64::from(level.value()));
    }
}

fn health_of(level: EscalationLevel) -> Health {
    match level.value() {
        0 => Health::Healthy,
        1 | 2 => Health::Degraded,
        _ => Health::Critical,
    }
}
