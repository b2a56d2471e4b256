//! Control plane error types

use bulwark_anomaly::DetectorError;
use bulwark_escalation::EscalationError;
use bulwark_estop::StopError;
use bulwark_kernel::{Classify, ErrorClass};
use bulwark_rollback::RollbackError;
use std::path::PathBuf;

/// Result type for control plane operations
pub type Result<T> = std::result::Result<T, PlaneError>;

/// Failure to load or validate a [`PlaneConfig`](crate::PlaneConfig)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// YAML text did not parse into a config
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML text did not parse into a config
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The file extension names no known format
    #[error("unsupported config format: {0} (expected .yaml, .yml or .toml)")]
    UnsupportedFormat(PathBuf),

    /// A section holds an invalid setting
    #[error("invalid [{section}] settings: {reason}")]
    Invalid {
        /// Section name, e.g. `breakers.payments`
        section: String,
        /// What is wrong
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(section: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            section: section.into(),
            reason: reason.into(),
        }
    }
}

impl Classify for ConfigError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Configuration
    }
}

/// Control plane operation errors
#[derive(Debug, thiserror::Error)]
pub enum PlaneError {
    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Escalation ladder rejected the move
    #[error(transparent)]
    Escalation(#[from] EscalationError),

    /// Rollback rejected the request
    #[error(transparent)]
    Rollback(#[from] RollbackError),

    /// Emergency stop rejected the request
    #[error(transparent)]
    Stop(#[from] StopError),

    /// Anomaly detector rejected the request
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

impl Classify for PlaneError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Config(e) => e.class(),
            Self::Escalation(e) => e.class(),
            Self::Rollback(e) => e.class(),
            Self::Stop(e) => e.class(),
            Self::Detector(e) => e.class(),
        }
    }
}
