//! Request and response types shared across the dispatch path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Context about who submitted a request and on whose behalf.
///
/// Carried through dispatch into audit events and recovery rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Tenant identifier for multi-tenant deployments.
    pub tenant_id: Option<String>,

    /// Workflow run this request belongs to.
    pub run_id: Option<String>,

    /// Correlation id for tracing.
    pub correlation_id: Option<String>,

    /// Additional custom metadata as key-value pairs.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RequestContext {
    /// Creates a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tenant ID.
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Sets the run ID.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Sets the correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Adds a custom metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Per-call overrides that take precedence over every configuration layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOverrides {
    /// Deadline for a single backend call.
    #[serde(default, with = "opt_duration_serde")]
    pub timeout: Option<Duration>,

    /// Retries allowed on one candidate after the first attempt.
    pub max_retries: Option<u32>,

    /// Base delay for generic retry backoff.
    #[serde(default, with = "opt_duration_serde")]
    pub retry_backoff: Option<Duration>,
}

/// A unit of work to route to one of several interchangeable backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Capability a backend must declare to serve this request.
    pub capability: String,

    /// Opaque payload handed to the transport.
    pub payload: serde_json::Value,

    /// Who submitted the request.
    pub context: RequestContext,

    /// Backends the caller pins the request to. Empty means "any".
    #[serde(default)]
    pub pinned_backends: Vec<String>,

    /// Per-call overrides.
    #[serde(default)]
    pub overrides: RequestOverrides,

    /// Executable unit this request runs on, if the caller tracks one.
    pub unit_id: Option<String>,
}

impl DispatchRequest {
    /// Creates a new request for the given capability.
    pub fn new(capability: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            capability: capability.into(),
            payload,
            context: RequestContext::new(),
            pinned_backends: Vec::new(),
            overrides: RequestOverrides::default(),
            unit_id: None,
        }
    }

    /// Sets the request context.
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the tenant on the request context.
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.context.tenant_id = Some(tenant_id.into());
        self
    }

    /// Pins the request to a backend. May be called more than once.
    pub fn pin_backend(mut self, backend_id: impl Into<String>) -> Self {
        self.pinned_backends.push(backend_id.into());
        self
    }

    /// Overrides the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.timeout = Some(timeout);
        self
    }

    /// Overrides the per-candidate retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.overrides.max_retries = Some(retries);
        self
    }

    /// Overrides the generic backoff base.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.overrides.retry_backoff = Some(backoff);
        self
    }

    /// Associates the request with an executable unit.
    pub fn with_unit(mut self, unit_id: impl Into<String>) -> Self {
        self.unit_id = Some(unit_id.into());
        self
    }

    /// Returns the tenant id, if any.
    pub fn tenant_id(&self) -> Option<&str> {
        self.context.tenant_id.as_deref()
    }
}

/// Attempts spent on one candidate during a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAttempt {
    /// Backend that was tried.
    pub backend_id: String,

    /// Calls made to this backend.
    pub attempts: u32,

    /// Category of the last failure, if the candidate failed.
    pub last_category: Option<crate::classify::ErrorCategory>,

    /// Whether the candidate was skipped without being called.
    pub skipped: bool,
}

/// A successful dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    /// Request that was served.
    pub request_id: String,

    /// Backend that served the request.
    pub backend_id: String,

    /// Value returned by the backend.
    pub output: serde_json::Value,

    /// Wall time from the start of dispatch to the successful call.
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,

    /// Total backend calls across all candidates.
    pub attempts: u32,

    /// Per-candidate attempt trail, in the order candidates were tried.
    pub trail: Vec<CandidateAttempt>,
}

/// Serde helper for Duration serialization.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde helper for optional Duration fields.
pub(crate) mod opt_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = DispatchRequest::new("search", serde_json::json!({"q": "rust"}))
            .with_tenant_id("acme")
            .pin_backend("a")
            .pin_backend("b")
            .with_timeout(Duration::from_millis(500))
            .with_unit("node-7");

        assert_eq!(request.capability, "search");
        assert_eq!(request.tenant_id(), Some("acme"));
        assert_eq!(request.pinned_backends, vec!["a", "b"]);
        assert_eq!(request.overrides.timeout, Some(Duration::from_millis(500)));
        assert_eq!(request.unit_id.as_deref(), Some("node-7"));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = DispatchRequest::new("search", serde_json::Value::Null);
        let b = DispatchRequest::new("search", serde_json::Value::Null);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_overrides_serialize_as_millis() {
        let overrides = RequestOverrides {
            timeout: Some(Duration::from_secs(2)),
            max_retries: Some(3),
            retry_backoff: None,
        };
        let json = serde_json::to_value(overrides).unwrap();
        assert_eq!(json["timeout"], 2000);
        assert_eq!(json["max_retries"], 3);
        assert!(json["retry_backoff"].is_null());

        let back: RequestOverrides = serde_json::from_value(json).unwrap();
        assert_eq!(back, overrides);
    }

    #[test]
    fn test_context_builder() {
        let ctx = RequestContext::new()
            .with_tenant_id("tenant-1")
            .with_run_id("run-9")
            .with_metadata("env", "production");

        assert_eq!(ctx.tenant_id, Some("tenant-1".into()));
        assert_eq!(ctx.run_id, Some("run-9".into()));
        assert_eq!(ctx.metadata.get("env"), Some(&"production".to_string()));
    }
}
