//! Dispatch counters and the decision histogram.

use crate::recovery::RecoveryAction;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by the dispatcher, breaker feedback and the
/// recovery orchestrator.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    aborts: AtomicU64,
    breaker_opens: AtomicU64,
    decisions: [AtomicU64; 5],
}

impl DispatchMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one backend call.
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one served dispatch.
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one failed backend call.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one aborted dispatch.
    pub fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one circuit opening.
    pub fn record_breaker_open(&self) {
        self.breaker_opens.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one recovery decision.
    pub fn record_decision(&self, action: RecoveryAction) {
        self.decisions[Self::slot(action)].fetch_add(1, Ordering::Relaxed);
    }

    /// Number of times `action` was decided.
    pub fn decision_count(&self, action: RecoveryAction) -> u64 {
        self.decisions[Self::slot(action)].load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            breaker_opens: self.breaker_opens.load(Ordering::Relaxed),
            decisions: RecoveryAction::ALL
                .iter()
                .map(|action| (action.as_str().to_string(), self.decision_count(*action)))
                .collect(),
        }
    }

    fn slot(action: RecoveryAction) -> usize {
        match action {
            RecoveryAction::Retry => 0,
            RecoveryAction::AutoFix => 1,
            RecoveryAction::HumanReview => 2,
            RecoveryAction::Fallback => 3,
            RecoveryAction::Abort => 4,
        }
    }
}

/// Serializable copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Backend calls made.
    pub attempts: u64,
    /// Dispatches served.
    pub successes: u64,
    /// Backend calls that failed.
    pub failures: u64,
    /// Dispatches that gave up.
    pub aborts: u64,
    /// Circuit openings caused by dispatch feedback.
    pub breaker_opens: u64,
    /// Decisions per action name.
    pub decisions: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_histogram() {
        let metrics = DispatchMetrics::new();
        metrics.record_attempt();
        metrics.record_attempt();
        metrics.record_failure();
        metrics.record_success();
        metrics.record_decision(RecoveryAction::Retry);
        metrics.record_decision(RecoveryAction::Retry);
        metrics.record_decision(RecoveryAction::Abort);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.decisions["RETRY"], 2);
        assert_eq!(snapshot.decisions["ABORT"], 1);
        assert_eq!(snapshot.decisions["AUTO_FIX"], 0);
        assert_eq!(snapshot.decisions.len(), 5);
    }
}
