//! Bulwark control plane
//!
//! Builds the six resilience mechanisms from one [`PlaneConfig`] and wires
//! them together:
//!
//! - **Circuit breakers** isolate failing dependencies
//! - **Escalation ladder** tracks incident severity
//! - **Rollback system** snapshots and restores component state
//! - **Anomaly detector** turns metric samples into alerts
//! - **Emergency stop** halts components by scope
//! - **Safety net** validates operations before they run
//!
//! The [`ResponsePolicy`] decides how alerts move the other mechanisms.

pub mod config;
pub mod error;
pub mod plane;
pub mod policy;
pub mod simulate;
pub mod telemetry;

pub use config::{BreakerSettings, PlaneConfig, Section};
pub use error::{ConfigError, PlaneError, Result};
pub use plane::{AlertResponse, ControlPlane, PlaneRecovery, PlaneStats, PLANE_ACTOR};
pub use policy::{ResponsePolicy, DEPENDENCY_KEY};
pub use simulate::{run_simulation, SimulationReport, SimulationStep};
pub use telemetry::{init_tracing, LogFormat};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
