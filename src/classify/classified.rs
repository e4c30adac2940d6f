//! Classified error records.

use crate::classify::category::ErrorCategory;
use crate::recovery::RecoveryAction;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A failure mapped into the closed taxonomy.
///
/// This is the only error shape the recovery logic ever reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Taxonomy bucket.
    pub category: ErrorCategory,

    /// Human-readable description.
    pub message: String,

    /// Structured detail (status codes, retry hints, backend extras).
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,

    /// Whether the failure may be retried.
    pub retryable: bool,

    /// Attempts made so far for the operation that failed.
    pub attempt: u32,

    /// Attempts the policy allows for that operation.
    pub max_attempts: u32,

    /// Backend the failure originated from, if any.
    pub backend_id: Option<String>,

    /// Executable unit the failure occurred on, if any.
    pub unit_id: Option<String>,

    /// When the failure was classified.
    pub timestamp: DateTime<Utc>,

    /// Recovery the backend or caller suggests. Advisory only.
    pub suggested_action: Option<RecoveryAction>,
}

impl ClassifiedError {
    /// Creates a classified error with the category's default retryability.
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            details: HashMap::new(),
            retryable: category.default_retryable(),
            attempt: 0,
            max_attempts: 1,
            backend_id: None,
            unit_id: None,
            timestamp: Utc::now(),
            suggested_action: None,
        }
    }

    /// Overrides retryability.
    ///
    /// Categories that are never retryable stay non-retryable.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable && !self.category.never_retryable();
        self
    }

    /// Adds a detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Sets the originating backend.
    pub fn with_backend(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = Some(backend_id.into());
        self
    }

    /// Sets the executable unit.
    pub fn with_unit(mut self, unit_id: impl Into<String>) -> Self {
        self.unit_id = Some(unit_id.into());
        self
    }

    /// Sets the attempt counters.
    pub fn with_attempts(mut self, attempt: u32, max_attempts: u32) -> Self {
        self.attempt = attempt;
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the suggested recovery action.
    pub fn with_suggested_action(mut self, action: RecoveryAction) -> Self {
        self.suggested_action = Some(action);
        self
    }

    /// Returns `true` if the error is retryable and attempts remain.
    pub fn can_retry(&self) -> bool {
        self.retryable && self.attempt < self.max_attempts
    }

    /// Returns `true` if this is a rate-limit signal.
    pub fn is_rate_limited(&self) -> bool {
        self.category == ErrorCategory::RateLimited
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend_id {
            Some(backend) => write!(f, "[{}] {} (backend '{}')", self.category, self.message, backend),
            None => write!(f, "[{}] {}", self.category, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retryability_follows_category() {
        assert!(ClassifiedError::new(ErrorCategory::Timeout, "slow").retryable);
        assert!(!ClassifiedError::new(ErrorCategory::Validation, "bad").retryable);
    }

    #[test]
    fn test_never_retryable_cannot_be_forced() {
        let err = ClassifiedError::new(ErrorCategory::Security, "denied").with_retryable(true);
        assert!(!err.retryable);

        let err = ClassifiedError::new(ErrorCategory::Internal, "blip").with_retryable(true);
        assert!(err.retryable);
    }

    #[test]
    fn test_can_retry_respects_attempts() {
        let err = ClassifiedError::new(ErrorCategory::Connection, "reset").with_attempts(0, 3);
        assert!(err.can_retry());

        let err = err.with_attempts(3, 3);
        assert!(!err.can_retry());
    }

    #[test]
    fn test_display_includes_backend() {
        let err = ClassifiedError::new(ErrorCategory::Timeout, "deadline exceeded").with_backend("a");
        assert_eq!(err.to_string(), "[TIMEOUT] deadline exceeded (backend 'a')");
    }
}
