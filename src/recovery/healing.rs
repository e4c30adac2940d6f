//! The self-healing collaborator invoked for AUTO_FIX decisions.

use crate::classify::ClassifiedError;
use crate::core::DispatchRequest;

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// A repair attempt that did not produce a usable request.
#[derive(Debug, Clone, Error)]
#[error("self-healing failed: {reason}")]
pub struct HealingFailure {
    /// Why the repair failed.
    pub reason: String,
}

impl HealingFailure {
    /// Creates a new failure.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Repairs a failed request so it can be dispatched again.
///
/// The orchestrator never repairs anything itself. Implementations receive
/// the failing request and its classified error and return the healed request
/// (typically with a corrected payload), or a terminal failure.
#[async_trait]
pub trait SelfHealer: Send + Sync + Debug {
    /// Attempts to repair the request.
    async fn heal(
        &self,
        unit_id: Option<&str>,
        request: &DispatchRequest,
        error: &ClassifiedError,
    ) -> Result<DispatchRequest, HealingFailure>;
}

/// A healer that refuses every repair.
///
/// Used when no repair service is configured, so AUTO_FIX degrades to a
/// terminal failure instead of looping.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHealer;

#[async_trait]
impl SelfHealer for NoopHealer {
    async fn heal(
        &self,
        _unit_id: Option<&str>,
        _request: &DispatchRequest,
        _error: &ClassifiedError,
    ) -> Result<DispatchRequest, HealingFailure> {
        Err(HealingFailure::new("no self-healer configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorCategory;

    #[tokio::test]
    async fn test_noop_healer_refuses() {
        let request = DispatchRequest::new("search", serde_json::Value::Null);
        let error = ClassifiedError::new(ErrorCategory::Validation, "bad payload");

        let result = NoopHealer.heal(None, &request, &error).await;
        assert!(result.unwrap_err().reason.contains("no self-healer"));
    }
}
