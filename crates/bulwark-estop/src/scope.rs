//! Stop reasons and scopes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a stop was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Operator request
    Manual,
    /// Security issue detected
    SecurityBreach,
    /// Resource limits exceeded
    ResourceExhaustion,
    /// Failures spreading across dependencies
    CascadingFailure,
    /// Unauthorized action attempted
    UnauthorizedAction,
    /// Data integrity issue
    DataCorruption,
    /// Anomaly detector crossed its limit
    AnomalyDetected,
    /// Signal from outside the control plane
    ExternalSignal,
}

impl StopReason {
    /// Stable string name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::SecurityBreach => "security_breach",
            Self::ResourceExhaustion => "resource_exhaustion",
            Self::CascadingFailure => "cascading_failure",
            Self::UnauthorizedAction => "unauthorized_action",
            Self::DataCorruption => "data_corruption",
            Self::AnomalyDetected => "anomaly_detected",
            Self::ExternalSignal => "external_signal",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breadth of a stop, narrowest first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StopScope {
    /// Named components
    Component,
    /// Components in the named subsystems
    Subsystem,
    /// Components in the named services, or all without names
    Service,
    /// Every registered component
    System,
    /// Every registered component
    Global,
}

impl StopScope {
    /// Stable string name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Subsystem => "subsystem",
            Self::Service => "service",
            Self::System => "system",
            Self::Global => "global",
        }
    }

    /// Check if the scope needs an explicit target list
    #[inline]
    #[must_use]
    pub const fn requires_targets(self) -> bool {
        matches!(self, Self::Component | Self::Subsystem)
    }

    /// Check if this scope contains `other`
    #[inline]
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self >= other
    }
}

impl fmt::Display for StopScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
