//! Anomaly alerts
//!
//! An alert carries the strongest signal found for one sample together
//! with its severity, confidence and a recommended response.

use crate::config::DetectionStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category of an anomaly, used to route alerts to handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Value out of its usual range
    #[default]
    Value,
    /// Too many samples in a time window
    Rate,
    /// Resource usage
    Resource,
    /// Security-relevant signal
    Security,
    /// Agent or user behavior
    Behavior,
}

impl AnomalyKind {
    /// Stable string name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Rate => "rate",
            Self::Resource => "resource",
            Self::Security => "security",
            Self::Behavior => "behavior",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Minor deviation
    #[default]
    Low,
    /// Noticeable deviation
    Medium,
    /// Large deviation
    High,
    /// Extreme deviation
    Critical,
}

impl Severity {
    /// Classify a z-score
    #[must_use]
    pub fn from_z_score(z: f64) -> Self {
        if z > 5.0 {
            Self::Critical
        } else if z > 4.0 {
            Self::High
        } else if z > 3.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Classify how far a value overshoots its limit (value / limit)
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 2.0 {
            Self::Critical
        } else if ratio > 1.5 {
            Self::High
        } else if ratio > 1.2 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Stable string name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which check produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Above the fixed threshold
    Threshold,
    /// Below the fixed minimum
    Minimum,
    /// Above the fixed maximum
    Maximum,
    /// z-score above the configured factor
    Statistical,
    /// Too many samples in the rate window
    Rate,
}

/// Alert identifier, `ANOMALY-000001` style
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    pub(crate) fn from_sequence(sequence: u64) -> Self {
        Self(format!("ANOMALY-{sequence:06}"))
    }

    /// Id as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One detected anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    /// Alert id
    pub id: AlertId,
    /// Metric category
    pub kind: AnomalyKind,
    /// Severity of the strongest signal
    pub severity: Severity,
    /// Detection time
    pub timestamp: DateTime<Utc>,
    /// Metric name
    pub metric: String,
    /// Human-readable description
    pub description: String,
    /// Offending sample
    pub value: f64,
    /// Expected value (limit or mean), if known
    pub expected: Option<f64>,
    /// z-score or overshoot ratio
    pub deviation: f64,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Strategy configured for the metric
    pub strategy: DetectionStrategy,
    /// Check that produced the alert
    pub signal: SignalKind,
    /// Suggested response
    pub recommended_action: String,
    /// Caller metadata passed to `record`
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Whether an operator acknowledged the alert
    pub acknowledged: bool,
}

impl AnomalyAlert {
    /// Metadata entry as a string, if present
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Suggested response for an anomaly category and severity
#[must_use]
pub fn recommended_action(kind: AnomalyKind, severity: Severity) -> &'static str {
    match (kind, severity) {
        (AnomalyKind::Rate, Severity::Critical) => "Immediately throttle or stop operations",
        (AnomalyKind::Rate, Severity::High) => "Enable rate limiting",
        (AnomalyKind::Value, Severity::Critical) => "Trigger circuit breaker",
        (AnomalyKind::Value, Severity::High) => "Alert on-call team",
        (AnomalyKind::Security, Severity::Critical) => "Emergency stop all operations",
        (AnomalyKind::Security, Severity::High) => "Isolate affected components",
        (AnomalyKind::Resource, Severity::Critical) => "Scale resources immediately",
        _ => "Monitor and investigate",
    }
}

/// Query over stored alerts
#[derive(Debug, Clone, PartialEq)]
pub struct AlertFilter {
    /// Only alerts at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Only alerts at or above this severity
    pub min_severity: Option<Severity>,
    /// Only alerts of this category
    pub kind: Option<AnomalyKind>,
    /// Most recent alerts to return
    pub limit: usize,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            since: None,
            min_severity: None,
            kind: None,
            limit: 100,
        }
    }
}

impl AlertFilter {
    /// Filter matching every alert, up to the default limit
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only alerts at or after `since`
    #[inline]
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Only alerts at or above `severity`
    #[inline]
    #[must_use]
    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Only alerts of `kind`
    #[inline]
    #[must_use]
    pub fn kind(mut self, kind: AnomalyKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Cap the number of alerts returned
    #[inline]
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Check if an alert passes the filter (ignores `limit`)
    #[must_use]
    pub fn matches(&self, alert: &AnomalyAlert) -> bool {
        self.since.map_or(true, |since| alert.timestamp >= since)
            && self.min_severity.map_or(true, |min| alert.severity >= min)
            && self.kind.map_or(true, |kind| alert.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bands() {
        assert_eq!(Severity::from_z_score(10.0), Severity::Critical);
        assert_eq!(Severity::from_z_score(4.5), Severity::High);
        assert_eq!(Severity::from_z_score(3.5), Severity::Medium);
        assert_eq!(Severity::from_z_score(2.5), Severity::Low);
        assert_eq!(Severity::from_ratio(2.5), Severity::Critical);
        assert_eq!(Severity::from_ratio(1.6), Severity::High);
        assert_eq!(Severity::from_ratio(1.3), Severity::Medium);
        assert_eq!(Severity::from_ratio(1.1), Severity::Low);
    }

    #[test]
    fn band_edges_are_exclusive() {
        assert_eq!(Severity::from_z_score(5.0), Severity::High);
        assert_eq!(Severity::from_ratio(2.0), Severity::High);
    }

    #[test]
    fn recommendations() {
        assert_eq!(
            recommended_action(AnomalyKind::Security, Severity::Critical),
            "Emergency stop all operations"
        );
        assert_eq!(
            recommended_action(AnomalyKind::Value, Severity::Critical),
            "Trigger circuit breaker"
        );
        assert_eq!(
            recommended_action(AnomalyKind::Behavior, Severity::Critical),
            "Monitor and investigate"
        );
    }

    #[test]
    fn alert_ids_are_zero_padded() {
        assert_eq!(AlertId::from_sequence(1).as_str(), "ANOMALY-000001");
        assert_eq!(AlertId::from_sequence(1_234_567).to_string(), "ANOMALY-1234567");
    }
}
