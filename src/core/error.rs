//! Error types for the routeguard library.
//!
//! Two families live here. [`BackendFailure`] is the raw failure a transport
//! reports; it is never acted on directly and always goes through the
//! classifier first. [`DispatchError`] covers misuse of the library itself
//! (unknown ids, illegal lifecycle transitions, bad configuration).

use crate::lifecycle::LifecycleStage;

use std::time::Duration;
use thiserror::Error;

/// A raw failure reported by a backend transport.
///
/// Variants carry whatever the transport could observe. The
/// [`ErrorClassifier`](crate::classify::ErrorClassifier) maps them into the
/// closed error taxonomy before any retry or recovery logic runs.
#[derive(Debug, Clone, Error)]
pub enum BackendFailure {
    /// The backend could not be reached.
    #[error("connection to backend failed: {message}")]
    Connection {
        /// Description of the connection problem.
        message: String,
    },

    /// The call ran past its deadline.
    #[error("call timed out after {elapsed:?}")]
    Timeout {
        /// How long the call ran before it was cut off.
        elapsed: Duration,
    },

    /// The backend asked the caller to slow down.
    #[error("rate limited by backend: retry after {retry_after:?}")]
    RateLimited {
        /// Suggested wait before the next call, if the backend sent one.
        retry_after: Option<Duration>,
    },

    /// The backend answered with an HTTP-like status code.
    #[error("backend returned status {code}: {message}")]
    Status {
        /// Status code.
        code: u16,
        /// Response message.
        message: String,
    },

    /// Credentials were rejected or the caller lacks permission.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Reason given by the backend.
        message: String,
    },

    /// The request payload was rejected as invalid.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input.
        message: String,
    },

    /// The backend is configured incorrectly.
    #[error("backend misconfigured: {message}")]
    Misconfigured {
        /// Description of the misconfiguration.
        message: String,
    },

    /// The backend ran out of some resource (memory, quota, slots).
    #[error("resource exhausted: {message}")]
    ResourceExhausted {
        /// Which resource ran out.
        message: String,
    },

    /// The backend failed internally.
    #[error("internal backend error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
        /// Whether the backend flagged the condition as transient.
        transient: bool,
    },

    /// Anything the transport could not put into a more specific bucket.
    #[error("{message}")]
    Other {
        /// Free-form failure text.
        message: String,
    },
}

impl BackendFailure {
    /// Creates a `Connection` failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a `Timeout` failure.
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    /// Creates a `RateLimited` failure.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Creates a `Status` failure.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Creates an `InvalidInput` failure.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates an `Internal` failure.
    pub fn internal(message: impl Into<String>, transient: bool) -> Self {
        Self::Internal {
            message: message.into(),
            transient,
        }
    }

    /// Creates an `Other` failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Returns the backend's `retry_after` hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised by the library's own operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No backend with this id is registered.
    #[error("unknown backend '{id}'")]
    UnknownBackend {
        /// The id that was looked up.
        id: String,
    },

    /// No executable unit with this id is tracked.
    #[error("unknown executable unit '{id}'")]
    UnknownUnit {
        /// The id that was looked up.
        id: String,
    },

    /// A lifecycle operation was attempted from a stage that does not allow it.
    #[error("invalid lifecycle transition for unit '{unit}': cannot {operation} from {from}")]
    InvalidTransition {
        /// Unit the transition was attempted on.
        unit: String,
        /// Stage the unit was in.
        from: LifecycleStage,
        /// Operation that was refused.
        operation: &'static str,
    },

    /// A lifecycle hook failed while loading a unit.
    #[error("failed to initialize unit '{unit}': {reason}")]
    InitializationFailed {
        /// Unit that failed to load.
        unit: String,
        /// Reason reported by the hook.
        reason: String,
    },

    /// Configuration could not be parsed or is inconsistent.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },
}

impl DispatchError {
    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// A specialized `Result` type for library operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
