//! Bulwark Emergency Stop - scoped kill switch
//!
//! An [`EmergencyStop`] halts registered components at one of five
//! nested scopes and later reverses the halt:
//! - `Component`: the named components
//! - `Subsystem`: components labelled with one of the named subsystems
//! - `Service`: components labelled with one of the named services, or all
//! - `System` and `Global`: every registered component
//!
//! A stop can be triggered manually or by a [`StopCondition`] polled
//! from a monitoring loop. Hook and handler failures are collected into
//! the returned [`StopResult`] / [`RecoveryResult`] and never abort the
//! sequence.

pub mod component;
pub mod condition;
pub mod config;
pub mod error;
mod registry;
pub mod scope;
pub mod stop;

pub use component::{StopHandler, StoppableComponent};
pub use condition::StopCondition;
pub use config::EstopConfig;
pub use error::StopError;
pub use scope::{StopReason, StopScope};
pub use stop::{EmergencyStop, RecoveryResult, StopNotice, StopResult, StopStatus};
