//! Anomaly detector
//!
//! Windows live behind one mutex per metric inside a [`DashMap`], so
//! concurrent `record` calls on different metrics never contend. Alert
//! handlers run after every lock is released.

use crate::alert::{
    recommended_action, AlertFilter, AlertId, AnomalyAlert, AnomalyKind, Severity, SignalKind,
};
use crate::config::{DetectorConfig, MetricConfig};
use crate::error::{DetectorError, Result};
use crate::window::MetricWindow;
use bulwark_kernel::{invoke, Handler, Health, SharedHandler};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Handler receiving every alert of its category
pub type AlertHandler = SharedHandler<AnomalyAlert, ()>;

/// Per-metric summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Samples in the window
    pub samples: usize,
    /// Window mean
    pub mean: Option<f64>,
    /// Window standard deviation
    pub std_dev: Option<f64>,
    /// Smallest sample
    pub min: Option<f64>,
    /// Largest sample
    pub max: Option<f64>,
    /// Most recent sample
    pub latest: Option<f64>,
    /// Metric category
    pub kind: AnomalyKind,
}

/// Detector statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStats {
    /// Metrics monitored
    pub metrics: usize,
    /// Samples accepted by `record`
    pub samples_recorded: u64,
    /// Non-finite samples skipped
    pub samples_skipped: u64,
    /// Alerts raised since construction
    pub alerts_raised: u64,
    /// Alerts currently retained
    pub alerts_retained: usize,
    /// Retained alerts not yet acknowledged
    pub unacknowledged: usize,
    /// Retained, unacknowledged alerts by severity
    pub unacknowledged_by_severity: BTreeMap<Severity, usize>,
    /// Health classification
    pub health: Health,
}

#[derive(Debug)]
struct MetricState {
    config: MetricConfig,
    window: MetricWindow,
}

impl MetricState {
    fn new(config: MetricConfig) -> Self {
        Self {
            window: MetricWindow::new(config.window_size),
            config,
        }
    }
}

/// Strongest breach found for one sample
#[derive(Debug, Clone)]
struct Signal {
    signal: SignalKind,
    severity: Severity,
    expected: Option<f64>,
    deviation: f64,
    confidence: f64,
    description: String,
}

/// Per-metric outlier detector
pub struct AnomalyDetector {
    config: DetectorConfig,
    metrics: DashMap<String, Arc<Mutex<MetricState>>>,
    alerts: Mutex<VecDeque<AnomalyAlert>>,
    handlers: RwLock<Vec<(Option<AnomalyKind>, AlertHandler)>>,
    sequence: AtomicU64,
    samples_recorded: AtomicU64,
    samples_skipped: AtomicU64,
}

impl fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("metrics", &self.metrics.len())
            .field("alerts_raised", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::empty(DetectorConfig::default())
    }
}

impl AnomalyDetector {
    /// Create detector and register the metrics named in `config`
    ///
    /// # Errors
    /// Returns `DetectorError::InvalidMetric` if a configured metric is invalid.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        if let Some(reason) = config.default_metric.problem() {
            return Err(DetectorError::InvalidMetric {
                name: "<default>".to_string(),
                reason,
            });
        }
        let metrics = config.metrics.clone();
        let detector = Self::empty(config);
        for (name, metric) in metrics {
            detector.add_metric(name, metric)?;
        }
        Ok(detector)
    }

    fn empty(config: DetectorConfig) -> Self {
        Self {
            config,
            metrics: DashMap::new(),
            alerts: Mutex::new(VecDeque::new()),
            handlers: RwLock::new(Vec::new()),
            sequence: AtomicU64::new(0),
            samples_recorded: AtomicU64::new(0),
            samples_skipped: AtomicU64::new(0),
        }
    }

    /// Detector configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Register (or replace) a metric, starting with an empty window
    ///
    /// # Errors
    /// Returns `DetectorError::InvalidMetric` if the config is invalid.
    pub fn add_metric(&self, name: impl Into<String>, config: MetricConfig) -> Result<()> {
        let name = name.into();
        if let Some(reason) = config.problem() {
            return Err(DetectorError::InvalidMetric { name, reason });
        }
        tracing::debug!(
            metric = %name,
            strategy = ?config.strategy,
            kind = %config.kind,
            "registered metric"
        );
        self.metrics
            .insert(name, Arc::new(Mutex::new(MetricState::new(config))));
        Ok(())
    }

    /// Config of a registered metric
    #[must_use]
    pub fn metric_config(&self, name: &str) -> Option<MetricConfig> {
        self.metrics.get(name).map(|state| state.lock().config.clone())
    }

    /// Registered metric names, sorted
    #[must_use]
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Add an alert handler, for one category or for all (`None`)
    pub fn add_handler<H>(&self, kind: Option<AnomalyKind>, handler: H)
    where
        H: Handler<AnomalyAlert, ()> + 'static,
    {
        self.handlers.write().push((kind, Arc::new(handler)));
    }

    /// Record a sample and return the alert it raised, if any
    ///
    /// Unknown metrics are registered with the default metric config.
    /// Non-finite values are skipped. Handler failures are logged and
    /// never reach the caller.
    pub async fn record(
        &self,
        name: &str,
        value: f64,
        metadata: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Option<AnomalyAlert> {
        if !value.is_finite() {
            self.samples_skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(metric = %name, value, "skipped non-finite sample");
            return None;
        }
        self.samples_recorded.fetch_add(1, Ordering::Relaxed);

        let state = self.state_for(name);
        let (signal, kind, strategy) = {
            let mut state = state.lock();
            let signal = evaluate(&mut state, value, Instant::now());
            (signal, state.config.kind, state.config.strategy)
        };
        let signal = signal?;

        let kind = if signal.signal == SignalKind::Rate {
            AnomalyKind::Rate
        } else {
            kind
        };
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let alert = AnomalyAlert {
            id: AlertId::from_sequence(sequence),
            kind,
            severity: signal.severity,
            timestamp: Utc::now(),
            metric: name.to_string(),
            description: signal.description,
            value,
            expected: signal.expected,
            deviation: signal.deviation,
            confidence: signal.confidence,
            strategy,
            signal: signal.signal,
            recommended_action: recommended_action(kind, signal.severity).to_string(),
            metadata: metadata.unwrap_or_default(),
            acknowledged: false,
        };

        tracing::warn!(
            alert = %alert.id,
            metric = %alert.metric,
            severity = %alert.severity,
            kind = %alert.kind,
            value,
            deviation = alert.deviation,
            "anomaly detected"
        );
        metrics::counter!(
            "bulwark_anomaly_alerts_total",
            "metric" => alert.metric.clone(),
            "severity" => alert.severity.as_str()
        )
        .increment(1);

        {
            let mut alerts = self.alerts.lock();
            alerts.push_back(alert.clone());
            while alerts.len() > self.config.alert_history {
                alerts.pop_front();
            }
        }

        self.dispatch(&alert).await;
        Some(alert)
    }

    fn state_for(&self, name: &str) -> Arc<Mutex<MetricState>> {
        if let Some(state) = self.metrics.get(name) {
            return Arc::clone(state.value());
        }
        let entry = self.metrics.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(metric = %name, "auto-registered metric");
            Arc::new(Mutex::new(MetricState::new(self.config.default_metric.clone())))
        });
        Arc::clone(entry.value())
    }

    async fn dispatch(&self, alert: &AnomalyAlert) {
        // Category handlers first, then global ones
        let handlers: Vec<AlertHandler> = {
            let handlers = self.handlers.read();
            let specific = handlers
                .iter()
                .filter(|(kind, _)| *kind == Some(alert.kind))
                .map(|(_, h)| Arc::clone(h));
            let global = handlers
                .iter()
                .filter(|(kind, _)| kind.is_none())
                .map(|(_, h)| Arc::clone(h));
            specific.chain(global).collect()
        };

        for handler in handlers {
            if let Err(e) = invoke(handler.as_ref(), alert.clone(), self.config.handler_timeout).await {
                tracing::warn!(alert = %alert.id, error = %e, "alert handler failed");
            }
        }
    }

    /// Mark an alert as acknowledged
    ///
    /// # Errors
    /// Returns `DetectorError::UnknownAlert` if the alert is not retained.
    pub fn acknowledge_alert(&self, id: &AlertId) -> Result<()> {
        let mut alerts = self.alerts.lock();
        let alert = alerts
            .iter_mut()
            .find(|a| &a.id == id)
            .ok_or_else(|| DetectorError::UnknownAlert(id.clone()))?;
        alert.acknowledged = true;
        tracing::info!(alert = %id, "alert acknowledged");
        Ok(())
    }

    /// Most recent alerts passing `filter`, oldest first
    #[must_use]
    pub fn alerts(&self, filter: &AlertFilter) -> Vec<AnomalyAlert> {
        let alerts = self.alerts.lock();
        let mut matched: Vec<AnomalyAlert> = alerts
            .iter()
            .rev()
            .filter(|a| filter.matches(a))
            .take(filter.limit)
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    /// Drop every retained alert, returning how many were dropped
    pub fn clear_alerts(&self) -> usize {
        let mut alerts = self.alerts.lock();
        let cleared = alerts.len();
        alerts.clear();
        cleared
    }

    /// Window summary for every metric
    #[must_use]
    pub fn metrics_summary(&self) -> BTreeMap<String, MetricSummary> {
        self.metrics
            .iter()
            .map(|entry| {
                let state = entry.value().lock();
                let stats = state.window.stats();
                let summary = MetricSummary {
                    samples: state.window.len(),
                    mean: stats.map(|s| s.mean),
                    std_dev: stats.map(|s| s.std_dev),
                    min: state.window.min(),
                    max: state.window.max(),
                    latest: state.window.latest(),
                    kind: state.config.kind,
                };
                (entry.key().clone(), summary)
            })
            .collect()
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> DetectorStats {
        let (retained, by_severity) = {
            let alerts = self.alerts.lock();
            let mut by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
            for alert in alerts.iter().filter(|a| !a.acknowledged) {
                *by_severity.entry(alert.severity).or_default() += 1;
            }
            (alerts.len(), by_severity)
        };

        let health = if by_severity.contains_key(&Severity::Critical) {
            Health::Critical
        } else if by_severity.contains_key(&Severity::High) {
            Health::Degraded
        } else {
            Health::Healthy
        };

        DetectorStats {
            metrics: self.metrics.len(),
            samples_recorded: self.samples_recorded.load(Ordering::Relaxed),
            samples_skipped: self.samples_skipped.load(Ordering::Relaxed),
            alerts_raised: self.sequence.load(Ordering::Relaxed),
            alerts_retained: retained,
            unacknowledged: by_severity.values().sum(),
            unacknowledged_by_severity: by_severity,
            health,
        }
    }
}

/// Append the sample and return the strongest breach it causes
fn evaluate(state: &mut MetricState, value: f64, now: Instant) -> Option<Signal> {
    let config = &state.config;
    // Baseline excludes the sample under test
    let baseline = state.window.stats();
    state.window.push(value, now);

    let mut signals = Vec::new();

    if let Some(threshold) = config.threshold.filter(|t| value > *t) {
        signals.push(bound_signal(
            SignalKind::Threshold,
            above(value, threshold),
            threshold,
            format!("value {value} exceeds threshold {threshold}"),
        ));
    }
    if let Some(min) = config.min.filter(|m| value < *m) {
        signals.push(bound_signal(
            SignalKind::Minimum,
            below(value, min),
            min,
            format!("value {value} is below minimum {min}"),
        ));
    }
    if let Some(max) = config.max.filter(|m| value > *m) {
        signals.push(bound_signal(
            SignalKind::Maximum,
            above(value, max),
            max,
            format!("value {value} exceeds maximum {max}"),
        ));
    }

    if config.strategy.uses_statistics() {
        let baseline = baseline.filter(|b| b.count >= config.min_samples && b.std_dev > 0.0);
        if let Some(baseline) = baseline {
            let z = (value - baseline.mean).abs() / baseline.std_dev;
            if z > config.std_dev_factor {
                signals.push(Signal {
                    signal: SignalKind::Statistical,
                    severity: Severity::from_z_score(z),
                    expected: Some(baseline.mean),
                    deviation: z,
                    confidence: (1.0 - 1.0 / (z * z)).clamp(0.0, 1.0),
                    description: format!(
                        "value {value} is {z:.2} standard deviations from mean {:.3}",
                        baseline.mean
                    ),
                });
            }
        }
    }

    if config.strategy.uses_rate() {
        if let Some(limit) = config.rate_limit {
            let count = state.window.count_within(now, limit.period);
            if count > limit.count {
                #[allow(clippy::cast_precision_loss)]
                let (observed, allowed) = (count as f64, limit.count as f64);
                let ratio = observed / allowed;
                signals.push(Signal {
                    signal: SignalKind::Rate,
                    severity: Severity::from_ratio(ratio),
                    expected: Some(allowed),
                    deviation: ratio,
                    confidence: 1.0,
                    description: format!(
                        "{count} samples within {:?} exceeds limit of {}",
                        limit.period, limit.count
                    ),
                });
            }
        }
    }

    signals.into_iter().max_by_key(|s| s.severity)
}

fn bound_signal(signal: SignalKind, ratio: f64, limit: f64, description: String) -> Signal {
    Signal {
        signal,
        severity: Severity::from_ratio(ratio),
        expected: Some(limit),
        deviation: ratio,
        confidence: 1.0,
        description,
    }
}

/// How far `value` sits above `limit`, as a multiple of the bound
///
/// Positive bounds compare proportionally; other bounds measure the
/// distance in units of `|limit|` (at least 1).
fn above(value: f64, limit: f64) -> f64 {
    if limit > 0.0 {
        value / limit
    } else {
        1.0 + (value - limit) / limit.abs().max(1.0)
    }
}

/// How far `value` sits below `limit`, as a multiple of the bound
///
/// Below a positive bound, zero and negative values always rate beyond
/// twice the bound and keep growing with the distance.
fn below(value: f64, limit: f64) -> f64 {
    if limit > 0.0 && value > 0.0 {
        limit / value
    } else if limit > 0.0 {
        2.0 + (limit - value) / limit
    } else {
        1.0 + (limit - value) / limit.abs().max(1.0)
    }
}
