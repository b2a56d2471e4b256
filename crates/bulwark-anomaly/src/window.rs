//! Sliding metric windows

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: f64,
    at: Instant,
}

/// Mean and sample standard deviation of a set of values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    /// Number of values
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation (n - 1), zero for fewer than two values
    pub std_dev: f64,
}

/// Bounded, ordered history of one metric (ring-buffer semantics)
#[derive(Debug, Clone)]
pub struct MetricWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl MetricWindow {
    /// Create window holding at most `capacity` samples
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest once full
    pub fn push(&mut self, value: f64, at: Instant) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { value, at });
    }

    /// Number of samples held
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Capacity
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values, oldest first
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    /// Most recent value
    #[must_use]
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().map(|s| s.value)
    }

    /// Smallest value
    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.values().reduce(f64::min)
    }

    /// Largest value
    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.values().reduce(f64::max)
    }

    /// Mean and standard deviation over the whole window
    #[must_use]
    pub fn stats(&self) -> Option<WindowStats> {
        stats_of(self.samples.iter().map(|s| s.value))
    }

    /// Samples recorded within `period` before `now`
    #[must_use]
    pub fn count_within(&self, now: Instant, period: Duration) -> usize {
        self.samples
            .iter()
            .rev()
            .take_while(|s| now.duration_since(s.at) <= period)
            .count()
    }
}

fn stats_of(values: impl Iterator<Item = f64> + Clone) -> Option<WindowStats> {
    let count = values.clone().count();
    if count == 0 {
        return None;
    }
    let n = count as f64;
    let mean = values.clone().sum::<f64>() / n;
    let std_dev = if count > 1 {
        let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    } else {
        0.0
    };
    Some(WindowStats {
        count,
        mean,
        std_dev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut window = MetricWindow::new(3);
        let now = Instant::now();
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v, now);
        }
        assert_eq!(window.values().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(window.latest(), Some(4.0));
        assert_eq!(window.min(), Some(2.0));
        assert_eq!(window.max(), Some(4.0));
    }

    #[test]
    fn sample_standard_deviation() {
        let mut window = MetricWindow::new(10);
        let now = Instant::now();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            window.push(v, now);
        }
        let stats = window.stats().unwrap();
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std_dev - 2.138_089_935).abs() < 1e-6);
    }

    #[test]
    fn single_value_has_zero_spread() {
        let mut window = MetricWindow::new(10);
        window.push(3.0, Instant::now());
        assert_eq!(window.stats().map(|s| s.std_dev), Some(0.0));
        assert!(MetricWindow::new(1).stats().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn counts_recent_samples() {
        let mut window = MetricWindow::new(100);
        window.push(1.0, Instant::now());
        tokio::time::advance(Duration::from_secs(5)).await;
        window.push(1.0, Instant::now());
        window.push(1.0, Instant::now());

        assert_eq!(window.count_within(Instant::now(), Duration::from_secs(1)), 2);
        assert_eq!(window.count_within(Instant::now(), Duration::from_secs(5)), 3);
    }
}
