//! Safety layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Validation layer, in execution order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLayer {
    /// Input validation and sanitization
    InputValidation = 1,
    /// Permission and authorization
    Permission = 2,
    /// Resource limits, quotas and dependency health
    ResourceLimit = 3,
    /// Behavior analysis
    Behavior = 4,
    /// Output validation
    OutputValidation = 5,
    /// Audit logging
    Audit = 6,
}

impl SafetyLayer {
    /// All layers in execution order
    pub const ALL: [Self; 6] = [
        Self::InputValidation,
        Self::Permission,
        Self::ResourceLimit,
        Self::Behavior,
        Self::OutputValidation,
        Self::Audit,
    ];

    /// Position in the pipeline, starting at 1
    #[inline]
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Stable string name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidation => "input_validation",
            Self::Permission => "permission",
            Self::ResourceLimit => "resource_limit",
            Self::Behavior => "behavior",
            Self::OutputValidation => "output_validation",
            Self::Audit => "audit",
        }
    }
}

impl fmt::Display for SafetyLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} {}", self.number(), self.as_str())
    }
}
