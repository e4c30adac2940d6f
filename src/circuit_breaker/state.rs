//! Circuit breaker state machine.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Per-backend breaker state.
///
/// HALF_OPEN is implicit: once `open_until` has passed the backend is allowed
/// again, and the first failure after that re-opens the circuit at once.
#[derive(Debug, Clone, Default)]
pub struct CircuitState {
    /// Consecutive failures since the last success or opening.
    pub consecutive_failures: u32,

    /// Requests are denied while `now < open_until`.
    pub open_until: Option<Instant>,
}

impl CircuitState {
    /// Creates a new closed state.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Returns `true` if a request may be sent at `now`.
    pub fn allows(&self, now: Instant) -> bool {
        match self.open_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    /// Returns the externally visible status at `now`.
    pub fn status(&self, now: Instant) -> BreakerStatus {
        match self.open_until {
            Some(until) if now < until => BreakerStatus::Open,
            Some(_) => BreakerStatus::HalfOpen,
            None => BreakerStatus::Closed,
        }
    }

    /// Returns how long the circuit stays open, if it is open at `now`.
    pub fn remaining_open(&self, now: Instant) -> Option<Duration> {
        self.open_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// Resets to closed.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.open_until = None;
    }

    /// Opens the circuit until `now + cool_down` and clears the counter.
    pub fn open(&mut self, now: Instant, cool_down: Duration) {
        self.consecutive_failures = 0;
        self.open_until = Some(now + cool_down);
    }
}

/// Externally visible breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    /// Requests pass through; failures are counted.
    Closed,
    /// Requests are rejected until the cool-down elapses.
    Open,
    /// Cool-down elapsed; the next failure re-opens immediately.
    HalfOpen,
}

impl BreakerStatus {
    /// Returns the name of the status.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Metrics about circuit breaker behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Outcomes recorded (successes plus counted failures).
    pub total_requests: u64,
    /// Successful requests.
    pub successful_requests: u64,
    /// Failed requests.
    pub failed_requests: u64,
    /// Admission checks refused because the circuit was open.
    pub rejected_requests: u64,
    /// Number of times the circuit has opened.
    pub times_opened: u64,
}

impl BreakerMetrics {
    /// Creates new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful request.
    pub fn record_success(&mut self) {
        self.total_requests += 1;
        self.successful_requests += 1;
    }

    /// Records a failed request.
    pub fn record_failure(&mut self) {
        self.total_requests += 1;
        self.failed_requests += 1;
    }

    /// Records a rejected request.
    pub fn record_rejected(&mut self) {
        self.rejected_requests += 1;
    }

    /// Records that the circuit opened.
    pub fn record_opened(&mut self) {
        self.times_opened += 1;
    }

    /// Returns the failure rate (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.failed_requests as f64 / self.total_requests as f64
    }
}

/// Point-in-time view of one backend's breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Backend the breaker guards.
    pub backend_id: String,
    /// Status at the time of the snapshot.
    pub status: BreakerStatus,
    /// Consecutive failures counted so far.
    pub consecutive_failures: u32,
    /// Milliseconds until the circuit admits traffic again, if open.
    pub open_remaining_ms: Option<u64>,
    /// Counters.
    pub metrics: BreakerMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_state_allows() {
        let state = CircuitState::closed();
        let now = Instant::now();
        assert!(state.allows(now));
        assert_eq!(state.status(now), BreakerStatus::Closed);
        assert_eq!(state.remaining_open(now), None);
    }

    #[test]
    fn test_open_then_half_open() {
        let mut state = CircuitState::closed();
        let now = Instant::now();
        state.consecutive_failures = 4;
        state.open(now, Duration::from_secs(30));

        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.allows(now + Duration::from_secs(10)));
        assert_eq!(state.status(now + Duration::from_secs(10)), BreakerStatus::Open);
        assert_eq!(
            state.remaining_open(now + Duration::from_secs(10)),
            Some(Duration::from_secs(20))
        );

        let later = now + Duration::from_secs(30);
        assert!(state.allows(later));
        assert_eq!(state.status(later), BreakerStatus::HalfOpen);
    }

    #[test]
    fn test_metrics() {
        let mut metrics = BreakerMetrics::new();
        assert_eq!(metrics.failure_rate(), 0.0);

        metrics.record_success();
        metrics.record_failure();
        metrics.record_rejected();

        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.rejected_requests, 1);
        assert!((metrics.failure_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(BreakerStatus::Closed.name(), "closed");
        assert_eq!(BreakerStatus::Open.to_string(), "open");
        assert_eq!(BreakerStatus::HalfOpen.name(), "half_open");
    }
}
