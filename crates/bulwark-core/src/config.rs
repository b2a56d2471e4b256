//! Control plane configuration
//!
//! One file carries every mechanism's settings. Each section has an
//! `enabled` flag next to the mechanism's own fields:
//!
//! ```yaml
//! name: checkout
//! breakers:
//!   default:
//!     failure_threshold: 5
//!   named:
//!     payments:
//!       failure_threshold: 2
//! escalation:
//!   max_escalation_rate: 5
//! response:
//!   stop_level: emergency
//! ```

use crate::error::ConfigError;
use crate::policy::ResponsePolicy;
use bulwark_anomaly::DetectorConfig;
use bulwark_breaker::BreakerConfig;
use bulwark_escalation::LadderConfig;
use bulwark_estop::EstopConfig;
use bulwark_rollback::RollbackConfig;
use bulwark_safety_net::SafetyNetConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

fn enabled_by_default() -> bool {
    true
}

/// A mechanism's settings plus an `enabled` flag
///
/// A disabled mechanism is still constructed, but the plane does not
/// drive it automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section<C> {
    /// Whether the plane drives this mechanism
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,

    /// Mechanism settings
    #[serde(flatten)]
    pub settings: C,
}

impl<C: Default> Default for Section<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C> Section<C> {
    /// Enabled section with `settings`
    #[inline]
    #[must_use]
    pub fn new(settings: C) -> Self {
        Self {
            enabled: true,
            settings,
        }
    }

    /// Disabled section with `settings`
    #[inline]
    #[must_use]
    pub fn disabled(settings: C) -> Self {
        Self {
            enabled: false,
            settings,
        }
    }
}

/// Breaker defaults plus per-dependency overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Config for breakers created on demand
    pub default: BreakerConfig,

    /// Breakers registered at startup, by dependency name
    pub named: BTreeMap<String, BreakerConfig>,
}

/// Every setting of a control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneConfig {
    /// Plane name, reported in stats
    pub name: String,

    /// Interval of the escalation supervisor and stop-condition monitor
    #[serde(with = "bulwark_kernel::serde_secs")]
    pub supervise_interval: Duration,

    /// Circuit breakers
    pub breakers: Section<BreakerSettings>,

    /// Escalation ladder
    pub escalation: Section<LadderConfig>,

    /// Rollback system
    pub rollback: Section<RollbackConfig>,

    /// Anomaly detector
    pub anomaly: Section<DetectorConfig>,

    /// Emergency stop
    pub estop: Section<EstopConfig>,

    /// Safety net
    pub safety_net: Section<SafetyNetConfig>,

    /// Automatic alert response
    pub response: ResponsePolicy,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            name: "bulwark".to_string(),
            supervise_interval: Duration::from_secs(1),
            breakers: Section::default(),
            escalation: Section::default(),
            rollback: Section::default(),
            anomaly: Section::default(),
            estop: Section::default(),
            safety_net: Section::default(),
            response: ResponsePolicy::default(),
        }
    }
}

impl PlaneConfig {
    /// Parse YAML text
    ///
    /// # Errors
    /// `ConfigError::Yaml` if the text is not a valid config.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// `ConfigError::Toml` if the text is not a valid config.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and validate a config file, choosing the format by extension
    ///
    /// # Errors
    /// - `ConfigError::UnsupportedFormat` for an unknown extension
    /// - `ConfigError::Io` if the file cannot be read
    /// - parse and validation errors otherwise
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self, ConfigError> = match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str,
            Some("toml") => Self::from_toml_str,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = parse(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), name = %config.name, "loaded plane config");
        Ok(config)
    }

    /// Set the plane name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a breaker for `dependency` at startup
    #[must_use]
    pub fn with_breaker(mut self, dependency: impl Into<String>, config: BreakerConfig) -> Self {
        self.breakers.settings.named.insert(dependency.into(), config);
        self
    }

    /// Replace the escalation settings
    #[inline]
    #[must_use]
    pub fn with_escalation(mut self, config: LadderConfig) -> Self {
        self.escalation.settings = config;
        self
    }

    /// Replace the anomaly settings
    #[inline]
    #[must_use]
    pub fn with_anomaly(mut self, config: DetectorConfig) -> Self {
        self.anomaly.settings = config;
        self
    }

    /// Replace the response policy
    #[inline]
    #[must_use]
    pub fn with_response(mut self, policy: ResponsePolicy) -> Self {
        self.response = policy;
        self
    }

    /// Reject zero thresholds, zero capacities and inverted bounds
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supervise_interval.is_zero() {
            return Err(ConfigError::invalid("plane", "supervise_interval must be positive"));
        }

        let breakers = &self.breakers.settings;
        if let Some(reason) = breakers.default.problem() {
            return Err(ConfigError::invalid("breakers.default", reason));
        }
        for (name, config) in &breakers.named {
            if let Some(reason) = config.problem() {
                return Err(ConfigError::invalid(format!("breakers.{name}"), reason));
            }
        }

        let checks = [
            ("escalation", self.escalation.settings.problem().map(str::to_string)),
            ("rollback", self.rollback.settings.problem().map(str::to_string)),
            ("anomaly", self.anomaly.settings.problem()),
            ("estop", self.estop.settings.problem().map(str::to_string)),
            ("safety_net", self.safety_net.settings.problem().map(str::to_string)),
            ("response", self.response.problem().map(str::to_string)),
        ];
        match checks.into_iter().find_map(|(section, problem)| problem.map(|p| (section, p))) {
            Some((section, reason)) => Err(ConfigError::invalid(section, reason)),
            None => Ok(()),
        }
    }
}
