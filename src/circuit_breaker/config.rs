//! Circuit breaker configuration.

use crate::classify::{ClassifiedError, ErrorCategory};
use std::time::Duration;

/// Default configuration applied to every backend's breaker.
///
/// Per-backend thresholds resolved from configuration take precedence; see
/// [`EffectiveSettings`](crate::config::EffectiveSettings).
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open.
    pub cool_down: Duration,

    /// What kinds of failures count toward the threshold.
    pub failure_policy: FailurePolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the cool-down window.
    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Creates a configuration that trips early and stays open longer.
    pub fn strict() -> Self {
        Self {
            failure_threshold: 3,
            cool_down: Duration::from_secs(60),
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Creates a configuration that tolerates more failures and recovers fast.
    pub fn high_availability() -> Self {
        Self {
            failure_threshold: 10,
            cool_down: Duration::from_secs(10),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Defines which classified failures count against a backend.
///
/// Failures caused by the request itself (invalid payload, rejected
/// credentials) say nothing about the backend's health and are ignored by
/// default.
#[derive(Debug, Clone)]
pub struct FailurePolicy {
    /// Categories that never count.
    pub ignored: Vec<ErrorCategory>,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            ignored: vec![ErrorCategory::Validation, ErrorCategory::Security],
        }
    }
}

impl FailurePolicy {
    /// Creates the default failure policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that counts every failure.
    pub fn all_errors() -> Self {
        Self {
            ignored: Vec::new(),
        }
    }

    /// Adds a category that should not count.
    pub fn ignoring(mut self, category: ErrorCategory) -> Self {
        if !self.ignored.contains(&category) {
            self.ignored.push(category);
        }
        self
    }

    /// Determines if an error should be counted as a failure.
    pub fn should_count(&self, error: &ClassifiedError) -> bool {
        !self.ignored.contains(&error.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cool_down, Duration::from_secs(30));
    }

    #[test]
    fn test_config_builder() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(0)
            .with_cool_down(Duration::from_secs(60));

        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.cool_down, Duration::from_secs(60));
    }

    #[test]
    fn test_presets() {
        let strict = CircuitBreakerConfig::strict();
        let ha = CircuitBreakerConfig::high_availability();
        let default = CircuitBreakerConfig::default();

        assert!(strict.failure_threshold < default.failure_threshold);
        assert!(strict.cool_down > default.cool_down);
        assert!(ha.failure_threshold > default.failure_threshold);
        assert!(ha.cool_down < default.cool_down);

        let invalid = ClassifiedError::new(ErrorCategory::Validation, "bad payload");
        assert!(!strict.failure_policy.should_count(&invalid));
        assert!(!ha.failure_policy.should_count(&invalid));
    }

    #[test]
    fn test_failure_policy() {
        let policy = FailurePolicy::default();

        let timeout = ClassifiedError::new(ErrorCategory::Timeout, "slow");
        assert!(policy.should_count(&timeout));

        let invalid = ClassifiedError::new(ErrorCategory::Validation, "bad payload");
        assert!(!policy.should_count(&invalid));

        assert!(FailurePolicy::all_errors().should_count(&invalid));

        let policy = FailurePolicy::new().ignoring(ErrorCategory::RateLimited);
        let throttled = ClassifiedError::new(ErrorCategory::RateLimited, "429");
        assert!(!policy.should_count(&throttled));
    }
}
