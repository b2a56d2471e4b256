//! Breaker states and the pure transition function

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protection state of one breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls pass through
    #[default]
    Closed,
    /// Calls are rejected
    Open,
    /// Probe calls are allowed
    HalfOpen,
}

impl BreakerState {
    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// All states
    pub const ALL: [Self; 3] = [Self::Closed, Self::Open, Self::HalfOpen];
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to the transition function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerEvent {
    /// Counted failures in the window reached the threshold
    FailureThresholdReached,
    /// The open timeout elapsed
    OpenTimeoutElapsed,
    /// Probe successes reached the threshold
    SuccessThresholdReached,
    /// A probe failed
    ProbeFailed,
    /// Operator forced CLOSED
    ManualReset,
    /// Operator forced OPEN
    ManualTrip,
}

impl BreakerEvent {
    /// All events
    pub const ALL: [Self; 6] = [
        Self::FailureThresholdReached,
        Self::OpenTimeoutElapsed,
        Self::SuccessThresholdReached,
        Self::ProbeFailed,
        Self::ManualReset,
        Self::ManualTrip,
    ];
}

/// Next state for `event` in `state`, or `None` if the event does not
/// apply there
///
/// Manual events apply in every state; a manual event targeting the
/// current state returns that state.
#[must_use]
pub const fn transition(state: BreakerState, event: BreakerEvent) -> Option<BreakerState> {
    use BreakerEvent as E;
    use BreakerState as S;

    match (state, event) {
        (S::Closed, E::FailureThresholdReached)
        | (S::HalfOpen, E::ProbeFailed)
        | (_, E::ManualTrip) => Some(S::Open),
        (S::Open, E::OpenTimeoutElapsed) => Some(S::HalfOpen),
        (S::HalfOpen, E::SuccessThresholdReached) | (_, E::ManualReset) => Some(S::Closed),
        _ => None,
    }
}
