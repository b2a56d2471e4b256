//! Bulwark Safety Net - layered pre-execution checks
//!
//! Checks are registered against one of six [`SafetyLayer`]s, which run
//! in fixed order. Within a layer checks run by ascending priority. A
//! failing blocking check stops the pass when fail-fast is on; a check
//! whose predicate errors or panics counts as failed and never aborts
//! the pass.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulwark_safety_net::{SafetyCheck, SafetyLayer, SafetyNet, SafetyNetConfig};
//!
//! let net = SafetyNet::new(SafetyNetConfig::default());
//! net.add_check(SafetyCheck::from_fn("non_empty", SafetyLayer::InputValidation, |s: &String| {
//!     !s.is_empty()
//! }));
//! let len = net.execute(|s| async move { s.len() }, "payload".to_string()).await?;
//! ```

pub mod check;
pub mod config;
pub mod defaults;
pub mod error;
pub mod layer;
pub mod net;

pub use check::{CheckInfo, CheckPredicate, CheckResult, FailureCallback, SafetyCheck};
pub use config::SafetyNetConfig;
pub use defaults::circuit_closed;
pub use error::SafetyError;
pub use layer::SafetyLayer;
pub use net::{SafetyNet, SafetyNetStats, ValidationReport, ValidationSummary};
