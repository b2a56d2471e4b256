//! Built-in checks
//!
//! `null_check`, `basic_permission` and `audit_log` cover JSON payloads;
//! [`circuit_closed`] gates any payload on a breaker.

use crate::check::SafetyCheck;
use crate::config::SafetyNetConfig;
use crate::layer::SafetyLayer;
use crate::net::SafetyNet;
use bulwark_breaker::CircuitBreaker;
use serde_json::Value;
use std::sync::Arc;

/// Block while `breaker` rejects calls (resource-limit layer)
pub fn circuit_closed<T>(breaker: Arc<CircuitBreaker>) -> SafetyCheck<T>
where
    T: Send + Sync + 'static,
{
    let name = format!("circuit_{}", breaker.name());
    let description = format!("dependency '{}' accepts calls", breaker.name());
    SafetyCheck::from_fn(name, SafetyLayer::ResourceLimit, move |_data: &T| {
        breaker.is_call_permitted()
    })
    .with_description(description)
}

/// Checks registered by [`SafetyNet::with_default_checks`]
#[must_use]
pub fn default_checks() -> Vec<SafetyCheck<Value>> {
    vec![
        SafetyCheck::from_fn("null_check", SafetyLayer::InputValidation, |data: &Value| {
            !data.is_null()
        })
        .with_description("Reject null payloads"),
        SafetyCheck::from_fn("basic_permission", SafetyLayer::Permission, |_data: &Value| true)
            .with_description("Placeholder permission gate"),
        SafetyCheck::from_fn("audit_log", SafetyLayer::Audit, |data: &Value| {
            tracing::info!(target: "bulwark::audit", payload = %data, "operation audited");
            true
        })
        .with_description("Record the operation for audit")
        .with_priority(100)
        .non_blocking(),
    ]
}

impl SafetyNet<Value> {
    /// Create net for JSON payloads with the built-in checks installed
    #[must_use]
    pub fn with_default_checks(config: SafetyNetConfig) -> Self {
        let net = Self::new(config);
        for check in default_checks() {
            net.add_check(check);
        }
        net
    }
}
