//! Named breaker registry
//!
//! One registry is constructed per process and passed to collaborators;
//! there is no global instance.

use crate::breaker::{BreakerStats, CircuitBreaker};
use crate::config::BreakerConfig;
use crate::error::BreakerError;
use bulwark_kernel::Health;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

/// Registry of circuit breakers keyed by dependency name
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: BreakerConfig,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl BreakerRegistry {
    /// Create registry; `default_config` is used for breakers created
    /// without an explicit config
    #[must_use]
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    /// Config applied to implicitly created breakers
    #[inline]
    #[must_use]
    pub fn default_config(&self) -> &BreakerConfig {
        &self.default_config
    }

    /// Register a breaker, replacing any existing one with the same name
    pub fn register(&self, name: impl Into<String>, config: BreakerConfig) -> Arc<CircuitBreaker> {
        let name = name.into();
        let breaker = Arc::new(CircuitBreaker::new(name.clone(), config));
        if self.breakers.insert(name.clone(), Arc::clone(&breaker)).is_some() {
            tracing::debug!(breaker = %name, "replaced circuit breaker");
        }
        breaker
    }

    /// Get a breaker by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Get a breaker, creating it with `config` (or the default) if missing
    pub fn get_or_create(&self, name: &str, config: Option<BreakerConfig>) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(breaker = %name, "created circuit breaker");
            Arc::new(CircuitBreaker::new(
                name,
                config.unwrap_or_else(|| self.default_config.clone()),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Remove a breaker
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.remove(name).map(|(_, breaker)| breaker)
    }

    /// Run `operation` through the named breaker, creating it if needed
    ///
    /// # Errors
    /// See [`CircuitBreaker::execute`].
    pub async fn execute<T, E, F, Fut>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        let breaker = self.get_or_create(name, None);
        breaker.execute(operation).await
    }

    /// Force every breaker OPEN
    pub fn trip_all(&self) {
        let breakers = self.snapshot();
        tracing::warn!(count = breakers.len(), "tripping all circuit breakers");
        for breaker in breakers {
            breaker.trip();
        }
    }

    /// Force every breaker CLOSED
    pub fn reset_all(&self) {
        let breakers = self.snapshot();
        tracing::info!(count = breakers.len(), "resetting all circuit breakers");
        for breaker in breakers {
            breaker.reset();
        }
    }

    /// Stats for every breaker, ordered by name
    #[must_use]
    pub fn all_stats(&self) -> BTreeMap<String, BreakerStats> {
        self.snapshot()
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.stats()))
            .collect()
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Worst health across all breakers
    #[must_use]
    pub fn health(&self) -> Health {
        Health::worst_of(self.all_stats().values().map(|stats| stats.health))
    }

    /// Number of breakers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Check if no breakers are registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    // Clone the handles out so no shard lock is held while breakers
    // notify their listeners
    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::BreakerState;
    use std::io;

    #[test]
    fn get_or_create_returns_same_instance() {
        let registry = BreakerRegistry::default();
        let first = registry.get_or_create("db", None);
        let second = registry.get_or_create("db", Some(BreakerConfig::new().with_failure_threshold(1)));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.config().failure_threshold, 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_replaces() {
        let registry = BreakerRegistry::default();
        let old = registry.get_or_create("db", None);
        let new = registry.register("db", BreakerConfig::new().with_failure_threshold(9));
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(registry.get("db").map(|b| b.config().failure_threshold), Some(9));
    }

    #[test]
    fn trip_all_and_reset_all() {
        let registry = BreakerRegistry::default();
        registry.get_or_create("a", None);
        registry.get_or_create("b", None);

        registry.trip_all();
        assert!(registry
            .all_stats()
            .values()
            .all(|s| s.state == BreakerState::Open));
        assert_eq!(registry.health(), Health::Critical);

        registry.reset_all();
        assert_eq!(registry.health(), Health::Healthy);
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn execute_creates_with_default_config() {
        let registry = BreakerRegistry::new(BreakerConfig::new().with_failure_threshold(1));
        let result = registry
            .execute("flaky", || async { Err::<(), _>(io::Error::other("down")) })
            .await;
        assert!(matches!(result, Err(BreakerError::Operation(_))));
        assert_eq!(registry.get("flaky").map(|b| b.state()), Some(BreakerState::Open));
    }
}
