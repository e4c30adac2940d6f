//! Mapping raw backend failures into the taxonomy.

use crate::classify::category::ErrorCategory;
use crate::classify::classified::ClassifiedError;
use crate::core::BackendFailure;

use serde_json::json;

/// Message fragments that mark an internal failure as transient.
const DEFAULT_TRANSIENT_MARKERS: &[&str] = &[
    "temporar",
    "transient",
    "try again",
    "unavailable",
    "deadlock",
    "busy",
];

/// Maps [`BackendFailure`]s into [`ClassifiedError`]s.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    transient_markers: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            transient_markers: DEFAULT_TRANSIENT_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl ErrorClassifier {
    /// Creates a classifier with the default transient markers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a lowercase message fragment that marks internal failures transient.
    pub fn with_transient_marker(mut self, marker: impl Into<String>) -> Self {
        self.transient_markers.push(marker.into().to_lowercase());
        self
    }

    /// Classifies a raw failure from the given backend.
    pub fn classify(&self, failure: &BackendFailure, backend_id: Option<&str>) -> ClassifiedError {
        let classified = match failure {
            BackendFailure::Connection { message } => {
                ClassifiedError::new(ErrorCategory::Connection, message.clone())
            }

            BackendFailure::Timeout { elapsed } => {
                ClassifiedError::new(ErrorCategory::Timeout, failure.to_string())
                    .with_detail("elapsed_ms", json!(elapsed.as_millis() as u64))
            }

            BackendFailure::RateLimited { retry_after } => {
                let err = ClassifiedError::new(ErrorCategory::RateLimited, failure.to_string());
                match retry_after {
                    Some(wait) => err.with_detail("retry_after_ms", json!(wait.as_millis() as u64)),
                    None => err,
                }
            }

            BackendFailure::Status { code, message } => {
                self.classify_status(*code, message)
                    .with_detail("status_code", json!(code))
            }

            BackendFailure::Unauthorized { message } => {
                ClassifiedError::new(ErrorCategory::Security, message.clone())
            }

            BackendFailure::InvalidInput { message } => {
                ClassifiedError::new(ErrorCategory::Validation, message.clone())
            }

            BackendFailure::Misconfigured { message } => {
                ClassifiedError::new(ErrorCategory::Configuration, message.clone())
            }

            BackendFailure::ResourceExhausted { message } => {
                ClassifiedError::new(ErrorCategory::Resource, message.clone())
            }

            BackendFailure::Internal { message, transient } => {
                let transient = *transient || self.is_transient(message);
                ClassifiedError::new(ErrorCategory::Internal, message.clone())
                    .with_retryable(transient)
                    .with_detail("transient", json!(transient))
            }

            BackendFailure::Other { message } => self.classify_message(message),
        };

        match backend_id {
            Some(id) => classified.with_backend(id),
            None => classified,
        }
    }

    /// Classifies a status code with its accompanying message.
    fn classify_status(&self, code: u16, message: &str) -> ClassifiedError {
        let category = match code {
            429 => ErrorCategory::RateLimited,
            401 | 403 => ErrorCategory::Security,
            400 | 404 | 409 | 413 | 422 => ErrorCategory::Validation,
            408 | 504 => ErrorCategory::Timeout,
            502 | 503 => ErrorCategory::Connection,
            507 => ErrorCategory::Resource,
            500 => ErrorCategory::Internal,
            501..=599 => ErrorCategory::External,
            _ => ErrorCategory::Unknown,
        };

        let err = ClassifiedError::new(category, message.to_string());
        if category == ErrorCategory::Internal {
            err.with_retryable(self.is_transient(message))
        } else {
            err
        }
    }

    /// Classifies a free-form failure message.
    pub fn classify_message(&self, message: &str) -> ClassifiedError {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        let category = if has(&["timed out", "timeout", "deadline"]) {
            ErrorCategory::Timeout
        } else if has(&["rate limit", "too many requests", "throttl"]) {
            ErrorCategory::RateLimited
        } else if has(&[
            "connection refused",
            "connection reset",
            "broken pipe",
            "unreachable",
            "dns",
        ]) {
            ErrorCategory::Connection
        } else if has(&["out of memory", "quota", "disk full", "no space", "capacity"]) {
            ErrorCategory::Resource
        } else if has(&["unauthorized", "forbidden", "permission denied", "access denied"]) {
            ErrorCategory::Security
        } else if has(&["config", "not configured", "missing setting"]) {
            ErrorCategory::Configuration
        } else if has(&["invalid", "malformed", "schema", "required field"]) {
            ErrorCategory::Validation
        } else if has(&["upstream", "external", "provider error"]) {
            ErrorCategory::External
        } else if has(&["internal", "panic", "assertion"]) {
            ErrorCategory::Internal
        } else {
            ErrorCategory::Unknown
        };

        let err = ClassifiedError::new(category, message.to_string());
        if category == ErrorCategory::Internal {
            err.with_retryable(self.is_transient(message))
        } else {
            err
        }
    }

    fn is_transient(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.transient_markers.iter().any(|m| lower.contains(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_variant_mapping() {
        let classifier = ErrorClassifier::new();

        let cases = [
            (BackendFailure::connection("refused"), ErrorCategory::Connection, true),
            (BackendFailure::timeout(Duration::from_secs(1)), ErrorCategory::Timeout, true),
            (BackendFailure::rate_limited(None), ErrorCategory::RateLimited, true),
            (
                BackendFailure::Unauthorized { message: "bad token".into() },
                ErrorCategory::Security,
                false,
            ),
            (BackendFailure::invalid_input("missing field"), ErrorCategory::Validation, false),
            (
                BackendFailure::Misconfigured { message: "no api key".into() },
                ErrorCategory::Configuration,
                false,
            ),
            (
                BackendFailure::ResourceExhausted { message: "pool empty".into() },
                ErrorCategory::Resource,
                true,
            ),
        ];

        for (failure, category, retryable) in cases {
            let classified = classifier.classify(&failure, Some("a"));
            assert_eq!(classified.category, category, "{failure}");
            assert_eq!(classified.retryable, retryable, "{failure}");
            assert_eq!(classified.backend_id.as_deref(), Some("a"));
        }
    }

    #[test]
    fn test_internal_transient_detection() {
        let classifier = ErrorClassifier::new();

        let flagged = classifier.classify(&BackendFailure::internal("boom", true), None);
        assert_eq!(flagged.category, ErrorCategory::Internal);
        assert!(flagged.retryable);

        let by_message = classifier.classify(
            &BackendFailure::internal("database temporarily unavailable", false),
            None,
        );
        assert!(by_message.retryable);

        let hard = classifier.classify(&BackendFailure::internal("null pointer", false), None);
        assert!(!hard.retryable);
    }

    #[test]
    fn test_status_codes() {
        let classifier = ErrorClassifier::new();
        let category = |code| {
            classifier
                .classify(&BackendFailure::status(code, "x"), None)
                .category
        };

        assert_eq!(category(429), ErrorCategory::RateLimited);
        assert_eq!(category(403), ErrorCategory::Security);
        assert_eq!(category(422), ErrorCategory::Validation);
        assert_eq!(category(504), ErrorCategory::Timeout);
        assert_eq!(category(503), ErrorCategory::Connection);
        assert_eq!(category(413), ErrorCategory::Validation);
        assert_eq!(category(500), ErrorCategory::Internal);
        assert_eq!(category(507), ErrorCategory::Resource);
        assert_eq!(category(501), ErrorCategory::External);
        assert_eq!(category(599), ErrorCategory::External);
        assert_eq!(category(302), ErrorCategory::Unknown);

        let err = classifier.classify(&BackendFailure::status(429, "slow down"), None);
        assert_eq!(err.details.get("status_code"), Some(&json!(429)));
    }

    #[test]
    fn test_rate_limit_hint_is_recorded() {
        let classifier = ErrorClassifier::new();
        let err = classifier.classify(
            &BackendFailure::rate_limited(Some(Duration::from_millis(1200))),
            None,
        );
        assert_eq!(err.details.get("retry_after_ms"), Some(&json!(1200)));
    }

    #[test]
    fn test_message_heuristics() {
        let classifier = ErrorClassifier::new();
        let category = |msg: &str| classifier.classify(&BackendFailure::other(msg), None).category;

        assert_eq!(category("request timed out"), ErrorCategory::Timeout);
        assert_eq!(category("Too Many Requests"), ErrorCategory::RateLimited);
        assert_eq!(category("connection reset by peer"), ErrorCategory::Connection);
        assert_eq!(category("quota exceeded"), ErrorCategory::Resource);
        assert_eq!(category("permission denied"), ErrorCategory::Security);
        assert_eq!(category("invalid payload"), ErrorCategory::Validation);
        assert_eq!(category("upstream returned garbage"), ErrorCategory::External);
        assert_eq!(category("something odd"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_custom_transient_marker() {
        let classifier = ErrorClassifier::new().with_transient_marker("LEADER ELECTION");
        let err = classifier.classify(
            &BackendFailure::internal("leader election in progress", false),
            None,
        );
        assert!(err.retryable);
    }
}
