//! Periodic metric collection
//!
//! A [`MetricSource`] is polled on every tick and each sample it returns
//! is fed into [`AnomalyDetector::record`]. A failing source is reported
//! and skipped; the other sources still run.

use crate::alert::AnomalyAlert;
use crate::detector::AnomalyDetector;
use bulwark_kernel::{
    invoke, spawn_periodic, ComponentFailure, Handler, LoopControl, LoopHandle, SharedHandler,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One value read from a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Metric name
    pub metric: String,
    /// Sampled value
    pub value: f64,
}

impl MetricSample {
    /// Create sample
    #[inline]
    #[must_use]
    pub fn new(metric: impl Into<String>, value: f64) -> Self {
        Self {
            metric: metric.into(),
            value,
        }
    }
}

/// Source polled by the collector
pub type MetricSource = SharedHandler<(), Vec<MetricSample>>;

/// Outcome of one collection pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    /// Samples recorded
    pub samples: usize,
    /// Alerts raised by those samples
    pub alerts: Vec<AnomalyAlert>,
    /// Sources that failed
    pub failures: Vec<ComponentFailure>,
}

/// Polls metric sources and feeds the detector
pub struct MetricCollector {
    detector: Arc<AnomalyDetector>,
    sources: RwLock<Vec<(String, MetricSource)>>,
    source_timeout: Option<Duration>,
}

impl std::fmt::Debug for MetricCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricCollector")
            .field("sources", &self.sources.read().len())
            .finish_non_exhaustive()
    }
}

impl MetricCollector {
    /// Create collector feeding `detector`
    #[must_use]
    pub fn new(detector: Arc<AnomalyDetector>) -> Self {
        let source_timeout = detector.config().handler_timeout;
        Self {
            detector,
            sources: RwLock::new(Vec::new()),
            source_timeout,
        }
    }

    /// Set the per-source timeout
    #[inline]
    #[must_use]
    pub fn with_source_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Detector fed by this collector
    #[inline]
    #[must_use]
    pub fn detector(&self) -> &Arc<AnomalyDetector> {
        &self.detector
    }

    /// Add a named source
    pub fn add_source<H>(&self, name: impl Into<String>, source: H)
    where
        H: Handler<(), Vec<MetricSample>> + 'static,
    {
        self.sources.write().push((name.into(), Arc::new(source)));
    }

    /// Poll every source once
    pub async fn collect_once(&self) -> CollectionReport {
        let sources = self.sources.read().clone();
        let mut report = CollectionReport::default();

        for (name, source) in sources {
            match invoke(source.as_ref(), (), self.source_timeout).await {
                Ok(samples) => {
                    for sample in samples {
                        report.samples += 1;
                        let alert = self.detector.record(&sample.metric, sample.value, None).await;
                        report.alerts.extend(alert);
                    }
                }
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "metric source failed");
                    report.failures.push(ComponentFailure::new(name, e));
                }
            }
        }

        report
    }

    /// Run `collect_once` every `interval` until the handle is stopped
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> LoopHandle {
        let collector = Arc::clone(self);
        spawn_periodic("anomaly-collector", interval, move || {
            let collector = Arc::clone(&collector);
            async move {
                let report = collector.collect_once().await;
                tracing::trace!(
                    samples = report.samples,
                    alerts = report.alerts.len(),
                    failures = report.failures.len(),
                    "collection pass finished"
                );
                LoopControl::Continue
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricConfig;
    use bulwark_kernel::{sync_handler, HandlerError, HandlerResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn detector_with_threshold() -> Arc<AnomalyDetector> {
        let detector = AnomalyDetector::default();
        detector
            .add_metric("queue_depth", MetricConfig::default().with_threshold(100.0))
            .unwrap();
        Arc::new(detector)
    }

    #[tokio::test]
    async fn collect_once_feeds_detector() {
        let collector = MetricCollector::new(detector_with_threshold());
        collector.add_source(
            "queue",
            sync_handler(|(): ()| {
                Ok(vec![
                    MetricSample::new("queue_depth", 50.0),
                    MetricSample::new("queue_depth", 500.0),
                ])
            }),
        );
        collector.add_source(
            "broken",
            sync_handler(|(): ()| -> HandlerResult<Vec<MetricSample>> {
                Err(HandlerError::failed("exporter down"))
            }),
        );

        let report = collector.collect_once().await;
        assert_eq!(report.samples, 2);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].component, "broken");
        assert_eq!(collector.detector().stats().samples_recorded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_polls_until_stopped() {
        let collector = Arc::new(MetricCollector::new(detector_with_threshold()));
        let polls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&polls);
        collector.add_source(
            "ticker",
            sync_handler(move |(): ()| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(vec![MetricSample::new("queue_depth", 1.0)])
            }),
        );

        let handle = collector.spawn(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(25)).await;
        handle.stop().await;

        // Ticks at 0s, 10s and 20s
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        let settled = polls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(polls.load(Ordering::SeqCst), settled);
    }
}
