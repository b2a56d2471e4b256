//! Bulwark Kernel - shared primitives for the resilience control plane
//!
//! Every mechanism in the workspace stores externally supplied callbacks
//! (save/restore handlers, stop hooks, escalation actions, alert handlers,
//! safety predicates). This crate provides:
//! - [`Handler`]: the single-method capability interface for those callbacks
//! - [`invoke`]: the uniform call + timeout + panic-capture wrapper
//! - [`HandlerError`] and the [`ErrorClass`] taxonomy shared by all crates
//! - [`Health`]: the classification reported by every `stats()` call
//! - [`spawn_periodic`]: a cancellable fixed-interval loop
//!
//! # Example
//!
//! ```rust,ignore
//! use bulwark_kernel::{invoke, sync_handler, Handler};
//!
//! let double = sync_handler(|x: u32| Ok(x * 2));
//! let out = invoke(&double, 21, None).await?;
//! assert_eq!(out, 42);
//! ```

pub mod error;
pub mod handler;
pub mod health;
pub mod periodic;
pub mod serde_secs;

pub use error::{Classify, ComponentFailure, ErrorClass, HandlerError};
pub use handler::{call_listener, invoke, sync_handler, Handler, HandlerResult, SharedHandler};
pub use health::Health;
pub use periodic::{spawn_periodic, LoopControl, LoopHandle};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
