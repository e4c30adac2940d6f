//! Mock transport for testing.
//!
//! This module provides a scriptable transport that can be used in tests to
//! simulate backend successes, failures and hangs without a real service.

use crate::core::{BackendFailure, DispatchRequest, Transport};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What a [`MockTransport`] does on one call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this value.
    Respond(serde_json::Value),
    /// Return the request payload unchanged.
    Echo,
    /// Fail with this failure.
    Fail(BackendFailure),
    /// Never answer; the dispatcher's deadline has to cut the call off.
    Hang,
}

/// A mock transport for testing purposes.
///
/// Calls consume scripted outcomes in order; once the script is empty every
/// call gets the default outcome.
///
/// # Examples
///
/// ```rust
/// use routeguard::backends::{MockOutcome, MockTransport};
/// use routeguard::core::BackendFailure;
/// use std::time::Duration;
///
/// // Echoes every payload back.
/// let transport = MockTransport::new();
///
/// // Refuses twice, then answers.
/// let transport = MockTransport::new()
///     .then(MockOutcome::Fail(BackendFailure::connection("refused")))
///     .then(MockOutcome::Fail(BackendFailure::connection("refused")))
///     .with_default_outcome(MockOutcome::Respond(serde_json::json!({"hits": 3})))
///     .with_latency(Duration::from_millis(20));
/// ```
#[derive(Debug)]
pub struct MockTransport {
    /// Name of this transport instance.
    name: String,
    /// Outcomes consumed by successive calls.
    script: Mutex<VecDeque<MockOutcome>>,
    /// Outcome once the script is exhausted.
    default_outcome: MockOutcome,
    /// Simulated latency before each outcome.
    latency: Option<Duration>,
    /// Counter for calls.
    call_count: AtomicU64,
    /// Payloads received, oldest first.
    payloads: Mutex<Vec<serde_json::Value>>,
}

impl MockTransport {
    /// Creates a transport that echoes payloads.
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            script: Mutex::new(VecDeque::new()),
            default_outcome: MockOutcome::Echo,
            latency: None,
            call_count: AtomicU64::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Creates a transport that always responds with `value`.
    pub fn responding(value: serde_json::Value) -> Self {
        Self::new().with_default_outcome(MockOutcome::Respond(value))
    }

    /// Creates a transport that always fails with `failure`.
    pub fn failing(failure: BackendFailure) -> Self {
        Self::new().with_default_outcome(MockOutcome::Fail(failure))
    }

    /// Creates a transport that never answers.
    pub fn hanging() -> Self {
        Self::new().with_default_outcome(MockOutcome::Hang)
    }

    /// Sets the name of this transport.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the outcome used once the script is exhausted.
    pub fn with_default_outcome(mut self, outcome: MockOutcome) -> Self {
        self.default_outcome = outcome;
        self
    }

    /// Appends a scripted outcome.
    pub fn then(self, outcome: MockOutcome) -> Self {
        self.push(outcome);
        self
    }

    /// Sets the simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Appends a scripted outcome (shared version).
    pub fn push(&self, outcome: MockOutcome) {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(outcome);
    }

    /// Returns the name of this transport.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of calls made.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Returns the payloads received, oldest first.
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.payloads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn next_outcome(&self) -> MockOutcome {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.default_outcome.clone())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(
        &self,
        request: &DispatchRequest,
        _timeout: Duration,
    ) -> Result<serde_json::Value, BackendFailure> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.payloads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.payload.clone());

        let outcome = self.next_outcome();

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match outcome {
            MockOutcome::Respond(value) => Ok(value),
            MockOutcome::Echo => Ok(request.payload.clone()),
            MockOutcome::Fail(failure) => Err(failure),
            MockOutcome::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> DispatchRequest {
        DispatchRequest::new("search", json!({"q": "rust"}))
    }

    #[tokio::test]
    async fn test_echo_by_default() {
        let transport = MockTransport::new();
        let result = transport.call(&request(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(result, json!({"q": "rust"}));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let transport = MockTransport::responding(json!("ok"))
            .then(MockOutcome::Fail(BackendFailure::connection("refused")));

        assert!(transport.call(&request(), Duration::from_secs(1)).await.is_err());
        assert_eq!(
            transport.call(&request(), Duration::from_secs(1)).await.unwrap(),
            json!("ok")
        );
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.payloads().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_never_answers() {
        let transport = MockTransport::hanging();
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            transport.call(&request(), Duration::from_millis(50)),
        )
        .await;
        assert!(result.is_err());
    }
}
