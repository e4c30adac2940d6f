//! The closed error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a classified failure.
///
/// The set is closed: every failure the dispatcher sees is mapped into
/// exactly one of these before any retry or recovery decision is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// The backend could not be reached.
    Connection,
    /// The call overran its deadline.
    Timeout,
    /// The backend ran out of memory, quota, or capacity.
    Resource,
    /// The backend or the request routing is misconfigured.
    Configuration,
    /// The request payload is invalid.
    Validation,
    /// Authentication, authorization, or policy violation.
    Security,
    /// The backend throttled the caller.
    RateLimited,
    /// The backend failed internally.
    Internal,
    /// A dependency behind the backend failed.
    External,
    /// Nothing more specific applies.
    Unknown,
}

impl ErrorCategory {
    /// All categories, in declaration order.
    pub const ALL: [ErrorCategory; 10] = [
        Self::Connection,
        Self::Timeout,
        Self::Resource,
        Self::Configuration,
        Self::Validation,
        Self::Security,
        Self::RateLimited,
        Self::Internal,
        Self::External,
        Self::Unknown,
    ];

    /// Returns whether failures of this category are retried by default.
    ///
    /// `Internal` is not retryable by default; the classifier upgrades it
    /// when the failure is marked transient.
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Timeout | Self::Resource | Self::RateLimited
        )
    }

    /// Returns whether this category can never be retried, whatever the
    /// backend claims.
    pub fn never_retryable(&self) -> bool {
        matches!(self, Self::Configuration | Self::Validation | Self::Security)
    }

    /// Returns the wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "CONNECTION",
            Self::Timeout => "TIMEOUT",
            Self::Resource => "RESOURCE",
            Self::Configuration => "CONFIGURATION",
            Self::Validation => "VALIDATION",
            Self::Security => "SECURITY",
            Self::RateLimited => "RATE_LIMITED",
            Self::Internal => "INTERNAL",
            Self::External => "EXTERNAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
