//! Keyed circuit breaker implementation.

use crate::audit;
use crate::circuit_breaker::config::CircuitBreakerConfig;
use crate::circuit_breaker::state::{BreakerMetrics, BreakerSnapshot, CircuitState};
use crate::classify::ClassifiedError;

use dashmap::DashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct BackendCircuit {
    state: CircuitState,
    metrics: BreakerMetrics,
}

/// Circuit breakers for every backend, keyed by backend id.
///
/// Entries are created lazily on first use. Each backend's state is updated
/// under its own map shard lock, so traffic to unrelated backends is never
/// serialized behind a single global lock.
///
/// # States
///
/// - **Closed**: requests pass through; consecutive failures are counted.
/// - **Open**: the backend is excluded from candidates until the cool-down
///   window elapses.
/// - **Half-Open**: implicit once the window has passed. Requests are
///   allowed, and the first failure re-opens the circuit immediately.
///
/// # Example
///
/// ```rust
/// use routeguard::circuit_breaker::CircuitBreaker;
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::with_defaults();
/// for _ in 0..5 {
///     breaker.record_failure("search-a", 5, Duration::from_secs(30));
/// }
/// assert!(!breaker.allow_request("search-a"));
/// assert!(breaker.allow_request("search-b"));
/// ```
pub struct CircuitBreaker {
    circuits: DashMap<String, BackendCircuit>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Creates a new breaker set with the given default configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: DashMap::new(),
            config,
        }
    }

    /// Creates a new breaker set with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Returns a reference to the default configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns `true` iff the backend's circuit admits a request now.
    ///
    /// Refusals are counted in the backend's metrics.
    pub fn allow_request(&self, backend_id: &str) -> bool {
        let Some(mut circuit) = self.circuits.get_mut(backend_id) else {
            return true;
        };

        let allowed = circuit.state.allows(Instant::now());
        if !allowed {
            circuit.metrics.record_rejected();
        }
        allowed
    }

    /// Returns `true` if the backend's circuit is currently open.
    pub fn is_open(&self, backend_id: &str) -> bool {
        self.circuits
            .get(backend_id)
            .map(|c| !c.state.allows(Instant::now()))
            .unwrap_or(false)
    }

    /// Records a success: clears the failure counter and any open window.
    pub fn record_success(&self, backend_id: &str) {
        let mut circuit = self.circuits.entry(backend_id.to_string()).or_default();
        circuit.state.reset();
        circuit.metrics.record_success();
    }

    /// Records a failure against the backend.
    ///
    /// When the counter reaches `threshold` the circuit opens for `cool_down`
    /// and the counter restarts from zero. A failure after an expired window
    /// (half-open) re-opens the circuit at once. Returns `true` if this call
    /// opened the circuit.
    pub fn record_failure(&self, backend_id: &str, threshold: u32, cool_down: Duration) -> bool {
        let now = Instant::now();
        let mut circuit = self.circuits.entry(backend_id.to_string()).or_default();
        circuit.metrics.record_failure();

        let half_open = circuit.state.open_until.is_some_and(|until| now >= until);
        if half_open {
            circuit.state.open(now, cool_down);
            circuit.metrics.record_opened();
            tracing::warn!(
                backend = backend_id,
                cool_down_ms = cool_down.as_millis() as u64,
                "Probe failed after cool-down, circuit re-opened"
            );
            audit::emit_breaker_opened(backend_id, cool_down, true);
            return true;
        }

        circuit.state.consecutive_failures += 1;
        if circuit.state.consecutive_failures >= threshold.max(1) {
            circuit.state.open(now, cool_down);
            circuit.metrics.record_opened();
            tracing::warn!(
                backend = backend_id,
                threshold,
                cool_down_ms = cool_down.as_millis() as u64,
                "Failure threshold reached, circuit opened"
            );
            audit::emit_breaker_opened(backend_id, cool_down, false);
            return true;
        }

        tracing::debug!(
            backend = backend_id,
            consecutive_failures = circuit.state.consecutive_failures,
            threshold,
            "Failure recorded"
        );
        false
    }

    /// Records a classified failure using the default configuration.
    ///
    /// Failures the failure policy ignores leave the circuit untouched.
    /// Returns `true` if this call opened the circuit.
    pub fn record_classified(&self, error: &ClassifiedError, backend_id: &str) -> bool {
        if !self.config.failure_policy.should_count(error) {
            return false;
        }
        self.record_failure(backend_id, self.config.failure_threshold, self.config.cool_down)
    }

    /// Forces the circuit open for `cool_down`.
    pub fn force_open(&self, backend_id: &str, cool_down: Duration) {
        let mut circuit = self.circuits.entry(backend_id.to_string()).or_default();
        circuit.state.open(Instant::now(), cool_down);
        circuit.metrics.record_opened();
        tracing::info!(backend = backend_id, "Circuit forced open");
    }

    /// Forces the circuit closed and clears its counter.
    pub fn force_close(&self, backend_id: &str) {
        let mut circuit = self.circuits.entry(backend_id.to_string()).or_default();
        circuit.state.reset();
        tracing::info!(backend = backend_id, "Circuit forced closed");
    }

    /// Drops all state and metrics for a backend.
    pub fn reset(&self, backend_id: &str) {
        self.circuits.remove(backend_id);
    }

    /// Returns a snapshot of one backend's breaker, if it has any state.
    pub fn snapshot(&self, backend_id: &str) -> Option<BreakerSnapshot> {
        let now = Instant::now();
        self.circuits
            .get(backend_id)
            .map(|c| Self::to_snapshot(backend_id, &c, now))
    }

    /// Returns snapshots for every backend with state, sorted by id.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let now = Instant::now();
        let mut snapshots: Vec<_> = self
            .circuits
            .iter()
            .map(|entry| Self::to_snapshot(entry.key(), entry.value(), now))
            .collect();
        snapshots.sort_by(|a, b| a.backend_id.cmp(&b.backend_id));
        snapshots
    }

    /// Returns the consecutive failure count for a backend.
    pub fn consecutive_failures(&self, backend_id: &str) -> u32 {
        self.circuits
            .get(backend_id)
            .map(|c| c.state.consecutive_failures)
            .unwrap_or(0)
    }

    /// Returns a copy of a backend's metrics.
    pub fn metrics(&self, backend_id: &str) -> BreakerMetrics {
        self.circuits
            .get(backend_id)
            .map(|c| c.metrics.clone())
            .unwrap_or_default()
    }

    fn to_snapshot(backend_id: &str, circuit: &BackendCircuit, now: Instant) -> BreakerSnapshot {
        BreakerSnapshot {
            backend_id: backend_id.to_string(),
            status: circuit.state.status(now),
            consecutive_failures: circuit.state.consecutive_failures,
            open_remaining_ms: circuit
                .state
                .remaining_open(now)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            metrics: circuit.metrics.clone(),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("backends", &self.circuits.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::state::BreakerStatus;
    use crate::classify::ErrorCategory;

    const COOL_DOWN: Duration = Duration::from_secs(30);

    #[test]
    fn test_unknown_backend_is_allowed() {
        let breaker = CircuitBreaker::with_defaults();
        assert!(breaker.allow_request("never-seen"));
        assert!(breaker.snapshot("never-seen").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_exact_threshold() {
        let breaker = CircuitBreaker::with_defaults();

        for _ in 0..4 {
            assert!(!breaker.record_failure("a", 5, COOL_DOWN));
        }
        assert!(breaker.allow_request("a"));

        assert!(breaker.record_failure("a", 5, COOL_DOWN));
        assert!(!breaker.allow_request("a"));
        assert_eq!(breaker.consecutive_failures("a"), 0);
        assert_eq!(breaker.metrics("a").times_opened, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_again_after_cool_down() {
        let breaker = CircuitBreaker::with_defaults();
        for _ in 0..5 {
            breaker.record_failure("a", 5, COOL_DOWN);
        }

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!breaker.allow_request("a"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.allow_request("a"));
        assert_eq!(breaker.snapshot("a").unwrap().status, BreakerStatus::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::with_defaults();
        for _ in 0..5 {
            breaker.record_failure("a", 5, COOL_DOWN);
        }
        tokio::time::advance(COOL_DOWN).await;
        assert!(breaker.allow_request("a"));

        assert!(breaker.record_failure("a", 5, COOL_DOWN));
        assert!(!breaker.allow_request("a"));
        assert_eq!(breaker.metrics("a").times_opened, 2);
    }

    #[test]
    fn test_success_resets_counter() {
        let breaker = CircuitBreaker::with_defaults();
        for _ in 0..4 {
            breaker.record_failure("a", 5, COOL_DOWN);
        }
        breaker.record_success("a");
        assert_eq!(breaker.consecutive_failures("a"), 0);

        for _ in 0..4 {
            breaker.record_failure("a", 5, COOL_DOWN);
        }
        assert!(breaker.allow_request("a"));
    }

    #[test]
    fn test_backends_are_independent() {
        let breaker = CircuitBreaker::with_defaults();
        for _ in 0..5 {
            breaker.record_failure("a", 5, COOL_DOWN);
        }
        assert!(!breaker.allow_request("a"));
        assert!(breaker.allow_request("b"));
    }

    #[test]
    fn test_force_open_close() {
        let breaker = CircuitBreaker::with_defaults();

        breaker.force_open("a", COOL_DOWN);
        assert!(breaker.is_open("a"));
        let snapshot = breaker.snapshot("a").unwrap();
        assert_eq!(snapshot.status, BreakerStatus::Open);
        assert!(snapshot.open_remaining_ms.is_some());

        breaker.force_close("a");
        assert!(!breaker.is_open("a"));
        assert_eq!(breaker.snapshot("a").unwrap().status, BreakerStatus::Closed);
    }

    #[test]
    fn test_rejections_are_counted() {
        let breaker = CircuitBreaker::with_defaults();
        breaker.force_open("a", COOL_DOWN);
        assert!(!breaker.allow_request("a"));
        assert!(!breaker.allow_request("a"));
        assert_eq!(breaker.metrics("a").rejected_requests, 2);
    }

    #[test]
    fn test_record_classified_respects_failure_policy() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::new().with_failure_threshold(1));

        let invalid = ClassifiedError::new(ErrorCategory::Validation, "bad input");
        assert!(!breaker.record_classified(&invalid, "a"));
        assert!(breaker.allow_request("a"));

        let refused = ClassifiedError::new(ErrorCategory::Connection, "refused");
        assert!(breaker.record_classified(&refused, "a"));
        assert!(!breaker.allow_request("a"));
    }

    #[test]
    fn test_snapshots_sorted() {
        let breaker = CircuitBreaker::with_defaults();
        breaker.record_success("c");
        breaker.record_success("a");
        breaker.record_success("b");

        let ids: Vec<_> = breaker.snapshots().into_iter().map(|s| s.backend_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
