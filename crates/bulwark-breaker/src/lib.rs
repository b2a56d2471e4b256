//! Bulwark Breaker - per-dependency trip/recover protection
//!
//! A [`CircuitBreaker`] wraps calls into one named dependency:
//! - CLOSED passes calls through and counts failures in a sliding window
//! - OPEN rejects calls until the open timeout elapses
//! - HALF_OPEN lets probes through and closes after enough successes
//!
//! State changes go through the pure [`transition`] function. The
//! [`BreakerRegistry`] owns one breaker per dependency name and supports
//! coordinated `trip_all`/`reset_all`.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulwark_breaker::{BreakerConfig, BreakerRegistry};
//!
//! let registry = BreakerRegistry::default();
//! let breaker = registry.get_or_create("payments", None);
//! let result = breaker.execute(|| async { call_payments().await }).await;
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod registry;
pub mod state;

pub use breaker::{BreakerMetrics, BreakerStats, CircuitBreaker, StateChange};
pub use config::BreakerConfig;
pub use error::BreakerError;
pub use registry::BreakerRegistry;
pub use state::{transition, BreakerEvent, BreakerState};
