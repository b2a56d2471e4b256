//! Bulwark Anomaly - per-metric outlier detection
//!
//! Each metric owns a bounded [`MetricWindow`]. Every recorded sample is
//! checked, in order, against:
//! - fixed threshold, minimum and maximum bounds
//! - a z-score against the window's prior samples
//! - a rate limit over a trailing time window
//!
//! The strongest breach becomes one [`AnomalyAlert`], which is stored and
//! passed to the registered alert handlers. Windows are locked per
//! metric, so metrics never contend with each other.

pub mod alert;
pub mod collector;
pub mod config;
pub mod detector;
pub mod error;
pub mod window;

pub use alert::{
    recommended_action, AlertFilter, AlertId, AnomalyAlert, AnomalyKind, Severity, SignalKind,
};
pub use collector::{CollectionReport, MetricCollector, MetricSample, MetricSource};
pub use config::{DetectionStrategy, DetectorConfig, MetricConfig, RateLimit};
pub use detector::{AlertHandler, AnomalyDetector, DetectorStats, MetricSummary};
pub use error::DetectorError;
pub use window::{MetricWindow, WindowStats};
