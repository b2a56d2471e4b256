//! Safety net pipeline

use crate::check::{CheckInfo, CheckResult, SafetyCheck};
use crate::config::SafetyNetConfig;
use crate::error::SafetyError;
use crate::layer::SafetyLayer;
use bulwark_kernel::{invoke, Health};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Results of one validation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Results in execution order
    pub results: Vec<CheckResult>,
    /// No blocking check failed
    pub passed: bool,
    /// Completion time
    pub timestamp: DateTime<Utc>,
}

impl ValidationReport {
    /// Failing blocking checks, in execution order
    #[must_use]
    pub fn failures(&self) -> Vec<CheckResult> {
        self.results.iter().filter(|r| r.blocks()).cloned().collect()
    }

    /// Check if the named check ran in this pass
    #[must_use]
    pub fn ran(&self, check: &str) -> bool {
        self.results.iter().any(|r| r.check == check)
    }
}

/// Condensed record of a past pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Checks run
    pub total_checks: usize,
    /// Checks passed
    pub passed: usize,
    /// Checks failed, blocking or not
    pub failed: usize,
    /// Whether the pass blocked the operation
    pub blocked: bool,
    /// Failed checks with their layers
    pub failures: Vec<(String, SafetyLayer)>,
}

impl From<&ValidationReport> for ValidationSummary {
    fn from(report: &ValidationReport) -> Self {
        let passed = report.results.iter().filter(|r| r.passed).count();
        Self {
            timestamp: report.timestamp,
            total_checks: report.results.len(),
            passed,
            failed: report.results.len() - passed,
            blocked: !report.passed,
            failures: report
                .results
                .iter()
                .filter(|r| !r.passed)
                .map(|r| (r.check.clone(), r.layer))
                .collect(),
        }
    }
}

/// Safety net statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyNetStats {
    /// Net name
    pub name: String,
    /// Registered checks
    pub total_checks: usize,
    /// Enabled checks
    pub enabled_checks: usize,
    /// Passes that blocked
    pub blocked_operations: u64,
    /// Passes that allowed the operation
    pub passed_operations: u64,
    /// Blocked share of all passes, zero before the first pass
    pub block_rate: f64,
    /// Enabled checks per layer
    pub checks_by_layer: BTreeMap<SafetyLayer, usize>,
    /// Health classification
    pub health: Health,
}

/// Ordered, layered pre-execution validation pipeline
pub struct SafetyNet<T> {
    config: SafetyNetConfig,
    checks: RwLock<BTreeMap<SafetyLayer, Vec<SafetyCheck<T>>>>,
    history: Mutex<VecDeque<ValidationSummary>>,
    blocked: AtomicU64,
    passed: AtomicU64,
}

impl<T> fmt::Debug for SafetyNet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyNet")
            .field("name", &self.config.name)
            .field("fail_fast", &self.config.fail_fast)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Default for SafetyNet<T> {
    fn default() -> Self {
        Self::new(SafetyNetConfig::default())
    }
}

impl<T: Send + Sync + 'static> SafetyNet<T> {
    /// Create net with no checks
    #[must_use]
    pub fn new(config: SafetyNetConfig) -> Self {
        Self {
            config,
            checks: RwLock::new(BTreeMap::new()),
            history: Mutex::new(VecDeque::new()),
            blocked: AtomicU64::new(0),
            passed: AtomicU64::new(0),
        }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SafetyNetConfig {
        &self.config
    }

    /// Add a check, replacing any check with the same name
    pub fn add_check(&self, check: SafetyCheck<T>) {
        tracing::debug!(
            net = %self.config.name,
            check = %check.name,
            layer = %check.layer,
            blocking = check.blocking,
            priority = check.priority,
            "added safety check"
        );
        let mut checks = self.checks.write();
        for layer_checks in checks.values_mut() {
            layer_checks.retain(|c| c.name != check.name);
        }
        let layer_checks = checks.entry(check.layer).or_default();
        layer_checks.push(check);
        // Stable: equal priorities keep registration order
        layer_checks.sort_by_key(|c| c.priority);
    }

    /// Remove a check
    ///
    /// # Errors
    /// Returns `SafetyError::UnknownCheck` if no check has `name`.
    pub fn remove_check(&self, name: &str) -> Result<(), SafetyError> {
        let mut checks = self.checks.write();
        for layer_checks in checks.values_mut() {
            if let Some(index) = layer_checks.iter().position(|c| c.name == name) {
                layer_checks.remove(index);
                return Ok(());
            }
        }
        Err(SafetyError::UnknownCheck(name.to_string()))
    }

    /// Enable a check
    ///
    /// # Errors
    /// Returns `SafetyError::UnknownCheck` if no check has `name`.
    pub fn enable_check(&self, name: &str) -> Result<(), SafetyError> {
        self.set_enabled(name, true)
    }

    /// Disable a check
    ///
    /// # Errors
    /// Returns `SafetyError::UnknownCheck` if no check has `name`.
    pub fn disable_check(&self, name: &str) -> Result<(), SafetyError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), SafetyError> {
        let mut checks = self.checks.write();
        let check = checks
            .values_mut()
            .flat_map(|layer_checks| layer_checks.iter_mut())
            .find(|c| c.name == name)
            .ok_or_else(|| SafetyError::UnknownCheck(name.to_string()))?;
        check.enabled = enabled;
        tracing::info!(net = %self.config.name, check = %name, enabled, "safety check toggled");
        Ok(())
    }

    /// Every registered check, in execution order
    #[must_use]
    pub fn list_checks(&self) -> Vec<CheckInfo> {
        self.checks
            .read()
            .values()
            .flat_map(|layer_checks| layer_checks.iter().map(SafetyCheck::info))
            .collect()
    }

    /// Run every enabled check against `data`
    ///
    /// Layers run in fixed order and checks by priority within a layer.
    /// With fail-fast, the first failing blocking check ends the pass.
    pub async fn validate(&self, data: Arc<T>) -> ValidationReport {
        let plan: Vec<SafetyCheck<T>> = self
            .checks
            .read()
            .values()
            .flat_map(|layer_checks| layer_checks.iter().filter(|c| c.enabled).cloned())
            .collect();

        let mut results = Vec::with_capacity(plan.len());
        for check in plan {
            let result = self.run_check(&check, &data).await;
            let stop = self.config.fail_fast && result.blocks();
            results.push(result);
            if stop {
                break;
            }
        }

        let passed = !results.iter().any(CheckResult::blocks);
        let report = ValidationReport {
            results,
            passed,
            timestamp: Utc::now(),
        };
        self.record(&report);
        report
    }

    async fn run_check(&self, check: &SafetyCheck<T>, data: &Arc<T>) -> CheckResult {
        let timeout = self.config.check_timeout;
        let (passed, error) = match invoke(check.predicate.as_ref(), Arc::clone(data), timeout).await {
            Ok(passed) => (passed, None),
            Err(e) => {
                tracing::warn!(net = %self.config.name, check = %check.name, error = %e, "safety check errored");
                (false, Some(e))
            }
        };

        if !passed && error.is_none() {
            if let Some(callback) = &check.on_failure {
                if let Err(e) = invoke(callback.as_ref(), Arc::clone(data), timeout).await {
                    tracing::warn!(net = %self.config.name, check = %check.name, error = %e, "on_failure callback failed");
                }
            }
        }

        if !passed {
            tracing::debug!(
                net = %self.config.name,
                check = %check.name,
                layer = %check.layer,
                blocking = check.blocking,
                "safety check failed"
            );
        }

        CheckResult {
            check: check.name.clone(),
            layer: check.layer,
            passed,
            blocking: check.blocking,
            timestamp: Utc::now(),
            error,
        }
    }

    fn record(&self, report: &ValidationReport) {
        if report.passed {
            self.passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.blocked.fetch_add(1, Ordering::Relaxed);
            for failure in report.results.iter().filter(|r| r.blocks()) {
                metrics::counter!(
                    "bulwark_safety_net_blocked_total",
                    "net" => self.config.name.clone(),
                    "check" => failure.check.clone()
                )
                .increment(1);
            }
        }

        let mut history = self.history.lock();
        history.push_back(ValidationSummary::from(report));
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    /// Validate, then run `operation` only if no blocking check failed
    ///
    /// # Errors
    /// Returns `SafetyError::CheckFailed` with the failing blocking checks;
    /// the operation is not invoked.
    pub async fn execute<F, Fut, O>(&self, operation: F, data: T) -> Result<O, SafetyError>
    where
        F: FnOnce(Arc<T>) -> Fut,
        Fut: Future<Output = O>,
    {
        let data = Arc::new(data);
        let report = self.validate(Arc::clone(&data)).await;
        if !report.passed {
            let failures = report.failures();
            tracing::warn!(
                net = %self.config.name,
                check = %failures.first().map_or("", |f| f.check.as_str()),
                failures = failures.len(),
                "operation blocked by safety net"
            );
            return Err(SafetyError::CheckFailed { failures });
        }
        Ok(operation(data).await)
    }

    /// Summaries of the most recent `limit` passes, oldest first
    #[must_use]
    pub fn recent_results(&self, limit: usize) -> Vec<ValidationSummary> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> SafetyNetStats {
        let (total_checks, enabled_checks, checks_by_layer) = {
            let checks = self.checks.read();
            let total: usize = checks.values().map(Vec::len).sum();
            let by_layer: BTreeMap<SafetyLayer, usize> = SafetyLayer::ALL
                .iter()
                .map(|layer| {
                    let enabled = checks
                        .get(layer)
                        .map_or(0, |c| c.iter().filter(|c| c.enabled).count());
                    (*layer, enabled)
                })
                .collect();
            let enabled: usize = by_layer.values().sum();
            (total, enabled, by_layer)
        };

        let blocked = self.blocked.load(Ordering::Relaxed);
        let passed = self.passed.load(Ordering::Relaxed);
        let total = blocked + passed;
        #[allow(clippy::cast_precision_loss)]
        let block_rate = if total == 0 {
            0.0
        } else {
            blocked as f64 / total as f64
        };
        let last_blocked = self.history.lock().back().is_some_and(|s| s.blocked);

        SafetyNetStats {
            name: self.config.name.clone(),
            total_checks,
            enabled_checks,
            blocked_operations: blocked,
            passed_operations: passed,
            block_rate,
            checks_by_layer,
            health: if last_blocked {
                Health::Degraded
            } else {
                Health::Healthy
            },
        }
    }
}
