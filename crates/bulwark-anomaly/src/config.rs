//! Detector and per-metric configuration

use crate::alert::AnomalyKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Which checks a metric runs beyond its fixed bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStrategy {
    /// Fixed bounds plus z-score
    Statistical,
    /// Fixed bounds only
    Threshold,
    /// Fixed bounds plus rate limit
    RateLimit,
    /// Every configured check
    #[default]
    Hybrid,
}

impl DetectionStrategy {
    pub(crate) fn uses_statistics(self) -> bool {
        matches!(self, Self::Statistical | Self::Hybrid)
    }

    pub(crate) fn uses_rate(self) -> bool {
        matches!(self, Self::RateLimit | Self::Hybrid)
    }
}

/// At most `count` samples per `period`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Samples allowed per period
    pub count: usize,
    /// Trailing period
    #[serde(with = "bulwark_kernel::serde_secs")]
    pub period: Duration,
}

impl RateLimit {
    /// Create rate limit
    #[inline]
    #[must_use]
    pub fn new(count: usize, period: Duration) -> Self {
        Self { count, period }
    }
}

/// Monitoring settings for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// Values above this are anomalous
    pub threshold: Option<f64>,
    /// Values below this are anomalous
    pub min: Option<f64>,
    /// Values above this are anomalous
    pub max: Option<f64>,
    /// z-score above which a sample is anomalous
    pub std_dev_factor: f64,
    /// Sample rate limit
    pub rate_limit: Option<RateLimit>,
    /// Which checks to run
    pub strategy: DetectionStrategy,
    /// Category used for handler routing and recommendations
    pub kind: AnomalyKind,
    /// Window capacity
    pub window_size: usize,
    /// Prior samples needed before the z-score check runs
    ///
    /// The baseline excludes the sample under test, so with the default
    /// of 10 the first sample checked is the 11th. Keeping an outlier out
    /// of its own baseline is what lets a 10-sigma spike rate CRITICAL.
    pub min_samples: usize,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            threshold: None,
            min: None,
            max: None,
            std_dev_factor: 2.0,
            rate_limit: None,
            strategy: DetectionStrategy::Hybrid,
            kind: AnomalyKind::Value,
            window_size: 1000,
            min_samples: 10,
        }
    }
}

impl MetricConfig {
    /// Config used for metrics recorded without registration
    #[must_use]
    pub fn statistical() -> Self {
        Self {
            strategy: DetectionStrategy::Statistical,
            ..Self::default()
        }
    }

    /// Set fixed threshold
    #[inline]
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Set minimum
    #[inline]
    #[must_use]
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Set maximum
    #[inline]
    #[must_use]
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Set z-score factor
    #[inline]
    #[must_use]
    pub fn with_std_dev_factor(mut self, factor: f64) -> Self {
        self.std_dev_factor = factor;
        self
    }

    /// Set rate limit
    #[inline]
    #[must_use]
    pub fn with_rate_limit(mut self, count: usize, period: Duration) -> Self {
        self.rate_limit = Some(RateLimit::new(count, period));
        self
    }

    /// Set strategy
    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, strategy: DetectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set category
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: AnomalyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set window capacity
    #[inline]
    #[must_use]
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Describe the first invalid setting, if any
    #[must_use]
    pub fn problem(&self) -> Option<String> {
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Some(format!("min {min} is greater than max {max}"));
            }
        }
        if self.window_size == 0 {
            return Some("window_size must be at least 1".to_string());
        }
        if self.std_dev_factor.is_nan() || self.std_dev_factor <= 0.0 {
            return Some("std_dev_factor must be positive".to_string());
        }
        if self.min_samples < 2 {
            return Some("min_samples must be at least 2".to_string());
        }
        match self.rate_limit {
            Some(limit) if limit.count == 0 || limit.period.is_zero() => {
                Some("rate_limit needs a positive count and period".to_string())
            }
            _ => None,
        }
    }
}

/// Detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Alerts retained for `alerts()` queries
    pub alert_history: usize,
    /// Timeout for each alert handler call
    #[serde(with = "bulwark_kernel::serde_secs::option")]
    pub handler_timeout: Option<Duration>,
    /// Config applied to metrics recorded without registration
    pub default_metric: MetricConfig,
    /// Metrics registered at construction
    pub metrics: BTreeMap<String, MetricConfig>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            alert_history: 1000,
            handler_timeout: Some(Duration::from_secs(10)),
            default_metric: MetricConfig::statistical(),
            metrics: BTreeMap::new(),
        }
    }
}

impl DetectorConfig {
    /// Set alert retention
    #[inline]
    #[must_use]
    pub fn with_alert_history(mut self, limit: usize) -> Self {
        self.alert_history = limit;
        self
    }

    /// Set handler timeout
    #[inline]
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Register a metric at construction
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, config: MetricConfig) -> Self {
        self.metrics.insert(name.into(), config);
        self
    }

    /// Describe the first invalid setting, if any
    #[must_use]
    pub fn problem(&self) -> Option<String> {
        if self.alert_history == 0 {
            return Some("alert_history must be at least 1".to_string());
        }
        if let Some(problem) = self.default_metric.problem() {
            return Some(format!("default_metric: {problem}"));
        }
        self.metrics
            .iter()
            .find_map(|(name, metric)| metric.problem().map(|p| format!("metric '{name}': {p}")))
    }
}
