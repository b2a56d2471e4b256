//! Bulwark Escalation - incident severity as an ordered ladder
//!
//! Six levels from [`EscalationLevel::Normal`] to
//! [`EscalationLevel::Disaster`]. The [`EscalationLadder`]:
//! - moves along the ladder via the pure [`next_level`] function
//! - rate-limits escalations in a trailing window
//! - runs level actions outside its bookkeeping lock
//! - queues events for acknowledgment and auto-escalates stale ones
//! - de-escalates on its own after a stability period

pub mod action;
pub mod config;
pub mod error;
pub mod event;
pub mod ladder;
pub mod level;

pub use action::{default_actions, ActionContext, ActionHandler, EscalationAction};
pub use config::LadderConfig;
pub use error::EscalationError;
pub use event::{EscalationEvent, EventId};
pub use ladder::{EscalationLadder, EscalationOutcome, LadderStatus};
pub use level::{next_level, EscalationLevel, LadderMove};
