//! The resilient dispatch loop.

use crate::audit;
use crate::circuit_breaker::CircuitBreaker;
use crate::classify::{ClassifiedError, ErrorCategory, ErrorClassifier};
use crate::config::{ConfigSource, EffectiveSettings, LayeredConfig};
use crate::core::{
    ArcTransport, BackendFailure, CandidateAttempt, DispatchError, DispatchRequest,
    DispatchResponse, DispatchResult, Transport,
};
use crate::dispatch::retry::BackoffPolicy;
use crate::metrics::DispatchMetrics;
use crate::registry::Backend;

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a dispatch produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    /// Selection produced no candidates.
    NoBackendAvailable,
    /// Every candidate was skipped or failed.
    AllBackendsFailed,
    /// The caller cancelled the dispatch.
    Cancelled,
}

impl AbortReason {
    /// Returns the canonical name of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoBackendAvailable => "NO_BACKEND_AVAILABLE",
            Self::AllBackendsFailed => "ALL_BACKENDS_FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dispatch that ended without a response.
#[derive(Debug, Clone, Error)]
#[error("dispatch aborted ({reason}) after {attempts} attempt(s)")]
pub struct DispatchAbort {
    /// Why the dispatch stopped.
    pub reason: AbortReason,
    /// Backend calls made across all candidates.
    pub attempts: u32,
    /// Per-candidate outcomes, in the order tried.
    pub trail: Vec<CandidateAttempt>,
    /// The last classified failure, if any call failed.
    pub last_error: Option<ClassifiedError>,
}

impl DispatchAbort {
    fn new(reason: AbortReason, attempts: u32, trail: Vec<CandidateAttempt>) -> Self {
        Self {
            reason,
            attempts,
            trail,
            last_error: None,
        }
    }

    fn with_last_error(mut self, error: Option<ClassifiedError>) -> Self {
        self.last_error = error;
        self
    }

    /// Returns `true` if the caller cancelled the dispatch.
    pub fn is_cancelled(&self) -> bool {
        self.reason == AbortReason::Cancelled
    }
}

/// Builder for creating a [`ResilientDispatcher`].
pub struct ResilientDispatcherBuilder {
    transports: DashMap<String, ArcTransport>,
    breaker: Option<Arc<CircuitBreaker>>,
    config: Option<Arc<dyn ConfigSource>>,
    defaults: EffectiveSettings,
    classifier: ErrorClassifier,
    backoff: BackoffPolicy,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl ResilientDispatcherBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            transports: DashMap::new(),
            breaker: None,
            config: None,
            defaults: EffectiveSettings::default(),
            classifier: ErrorClassifier::default(),
            backoff: BackoffPolicy::default(),
            metrics: None,
        }
    }

    /// Registers the transport for a backend.
    pub fn add_transport<T: Transport + 'static>(self, backend_id: impl Into<String>, transport: T) -> Self {
        self.transports.insert(backend_id.into(), Arc::new(transport));
        self
    }

    /// Registers a shared transport for a backend.
    pub fn add_arc_transport(self, backend_id: impl Into<String>, transport: ArcTransport) -> Self {
        self.transports.insert(backend_id.into(), transport);
        self
    }

    /// Sets the circuit breakers fed by dispatch outcomes.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Sets the configuration source for per-backend and per-tenant settings.
    pub fn with_config(mut self, config: Arc<dyn ConfigSource>) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the lowest settings layer.
    pub fn with_defaults(mut self, defaults: EffectiveSettings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the error classifier.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sets the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the shared metrics.
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the dispatcher.
    pub fn build(self) -> DispatchResult<ResilientDispatcher> {
        if self.defaults.timeout.is_zero() {
            return Err(DispatchError::configuration("default timeout must be greater than zero"));
        }

        Ok(ResilientDispatcher {
            transports: self.transports,
            breaker: self.breaker.unwrap_or_else(|| Arc::new(CircuitBreaker::with_defaults())),
            config: self.config.unwrap_or_else(|| Arc::new(LayeredConfig::new())),
            defaults: self.defaults,
            classifier: self.classifier,
            backoff: self.backoff,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

impl Default for ResilientDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

enum CallOutcome {
    Served(serde_json::Value),
    Failed(BackendFailure),
    Cancelled,
}

/// Sends a request to an ordered candidate list with per-call deadlines,
/// bounded retries and failover.
///
/// Candidates are tried in the order given. Each one is tried up to its
/// resolved `max_retries + 1` times; retryable failures back off before the
/// next call, everything else falls through to the next candidate at once.
/// A candidate that ends in failure counts once against its circuit breaker.
///
/// # Example
///
/// ```rust,no_run
/// use routeguard::backends::MockTransport;
/// use routeguard::dispatch::ResilientDispatcher;
/// use routeguard::registry::Backend;
/// use routeguard::core::DispatchRequest;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let dispatcher = ResilientDispatcher::builder()
///     .add_transport("search-a", MockTransport::new())
///     .build()?;
///
/// let backend = Arc::new(Backend::new("search-a").with_capability("search"));
/// let request = DispatchRequest::new("search", serde_json::json!({"q": "rust"}));
/// let response = dispatcher.dispatch(&request, &[backend]).await?;
/// println!("served by {}", response.backend_id);
/// # Ok(())
/// # }
/// ```
pub struct ResilientDispatcher {
    transports: DashMap<String, ArcTransport>,
    breaker: Arc<CircuitBreaker>,
    config: Arc<dyn ConfigSource>,
    defaults: EffectiveSettings,
    classifier: ErrorClassifier,
    backoff: BackoffPolicy,
    metrics: Arc<DispatchMetrics>,
}

impl ResilientDispatcher {
    /// Creates a new builder.
    pub fn builder() -> ResilientDispatcherBuilder {
        ResilientDispatcherBuilder::new()
    }

    /// Registers or replaces the transport for a backend.
    pub fn set_transport(&self, backend_id: impl Into<String>, transport: ArcTransport) {
        self.transports.insert(backend_id.into(), transport);
    }

    /// Removes the transport for a backend.
    pub fn remove_transport(&self, backend_id: &str) -> Option<ArcTransport> {
        self.transports.remove(backend_id).map(|(_, t)| t)
    }

    /// Returns the circuit breakers this dispatcher feeds.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Returns the shared metrics.
    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Returns the settings in effect for `backend` serving `request`.
    pub fn effective_settings(&self, request: &DispatchRequest, backend: &Backend) -> EffectiveSettings {
        self.defaults
            .resolve(self.config.as_ref(), backend, request.tenant_id(), &request.overrides)
    }

    /// Dispatches without a cancellation signal.
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
        candidates: &[Arc<Backend>],
    ) -> Result<DispatchResponse, DispatchAbort> {
        self.dispatch_with_cancel(request, candidates, &CancellationToken::new())
            .await
    }

    /// Dispatches `request` over `candidates`, stopping early if `cancel`
    /// fires.
    ///
    /// Cancellation ends the dispatch with [`AbortReason::Cancelled`] and
    /// leaves the breakers untouched.
    pub async fn dispatch_with_cancel(
        &self,
        request: &DispatchRequest,
        candidates: &[Arc<Backend>],
        cancel: &CancellationToken,
    ) -> Result<DispatchResponse, DispatchAbort> {
        let started = Instant::now();

        if candidates.is_empty() {
            tracing::warn!(
                request_id = %request.id,
                capability = %request.capability,
                "No backend available"
            );
            return Err(self.abort(request, DispatchAbort::new(AbortReason::NoBackendAvailable, 0, Vec::new())));
        }

        let mut total_attempts = 0u32;
        let mut trail = Vec::with_capacity(candidates.len());
        let mut last_error: Option<ClassifiedError> = None;

        for backend in candidates {
            if cancel.is_cancelled() {
                let abort = DispatchAbort::new(AbortReason::Cancelled, total_attempts, trail)
                    .with_last_error(last_error);
                return Err(self.abort(request, abort));
            }

            let settings = self.effective_settings(request, backend);

            if settings.disabled || self.breaker.is_open(&backend.id) {
                tracing::debug!(
                    request_id = %request.id,
                    backend = %backend.id,
                    disabled = settings.disabled,
                    "Skipping candidate"
                );
                trail.push(skipped(&backend.id));
                continue;
            }

            let Some(transport) = self.transport(&backend.id) else {
                tracing::warn!(backend = %backend.id, "No transport registered for candidate");
                let error = ClassifiedError::new(
                    ErrorCategory::Configuration,
                    format!("no transport registered for backend '{}'", backend.id),
                )
                .with_backend(backend.id.clone());
                trail.push(CandidateAttempt {
                    last_category: Some(error.category),
                    ..skipped(&backend.id)
                });
                last_error = Some(with_unit(error, request));
                continue;
            };

            let max_attempts = settings.max_attempts();
            let mut attempt = 0u32;

            loop {
                attempt += 1;
                total_attempts += 1;
                self.metrics.record_attempt();

                tracing::debug!(
                    request_id = %request.id,
                    backend = %backend.id,
                    attempt,
                    max_attempts,
                    timeout_ms = settings.timeout.as_millis() as u64,
                    "Calling backend"
                );

                let failure = match self.call(&transport, request, settings.timeout, cancel).await {
                    CallOutcome::Served(output) => {
                        self.breaker.record_success(&backend.id);
                        self.metrics.record_success();
                        trail.push(CandidateAttempt {
                            backend_id: backend.id.clone(),
                            attempts: attempt,
                            last_category: None,
                            skipped: false,
                        });

                        let response = DispatchResponse {
                            request_id: request.id.clone(),
                            backend_id: backend.id.clone(),
                            output,
                            elapsed: started.elapsed(),
                            attempts: total_attempts,
                            trail,
                        };
                        tracing::info!(
                            request_id = %request.id,
                            backend = %backend.id,
                            attempts = total_attempts,
                            elapsed_ms = response.elapsed.as_millis() as u64,
                            "Dispatch served"
                        );
                        audit::emit_dispatch_completed(request, &response);
                        return Ok(response);
                    }
                    CallOutcome::Failed(failure) => failure,
                    CallOutcome::Cancelled => {
                        trail.push(CandidateAttempt {
                            backend_id: backend.id.clone(),
                            attempts: attempt,
                            last_category: None,
                            skipped: false,
                        });
                        let abort = DispatchAbort::new(AbortReason::Cancelled, total_attempts, trail)
                            .with_last_error(last_error);
                        return Err(self.abort(request, abort));
                    }
                };

                self.metrics.record_failure();
                let error = with_unit(
                    self.classifier
                        .classify(&failure, Some(&backend.id))
                        .with_attempts(attempt, max_attempts),
                    request,
                );

                tracing::warn!(
                    request_id = %request.id,
                    backend = %backend.id,
                    attempt,
                    max_attempts,
                    category = %error.category,
                    error = %error.message,
                    "Backend call failed"
                );

                if error.can_retry() {
                    let delay = if error.is_rate_limited() {
                        self.backoff
                            .rate_limit_delay(settings.rate_limit_backoff, attempt, failure.retry_after())
                    } else {
                        self.backoff.delay_for_retry(settings.retry_backoff, attempt)
                    };

                    tracing::debug!(
                        backend = %backend.id,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off before retry"
                    );

                    last_error = Some(error);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            trail.push(CandidateAttempt {
                                backend_id: backend.id.clone(),
                                attempts: attempt,
                                last_category: last_error.as_ref().map(|e| e.category),
                                skipped: false,
                            });
                            let abort = DispatchAbort::new(AbortReason::Cancelled, total_attempts, trail)
                                .with_last_error(last_error);
                            return Err(self.abort(request, abort));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }

                if self.breaker.config().failure_policy.should_count(&error)
                    && self
                        .breaker
                        .record_failure(&backend.id, settings.failure_threshold, settings.cool_down)
                {
                    self.metrics.record_breaker_open();
                }

                trail.push(CandidateAttempt {
                    backend_id: backend.id.clone(),
                    attempts: attempt,
                    last_category: Some(error.category),
                    skipped: false,
                });
                last_error = Some(error);
                break;
            }
        }

        let abort = DispatchAbort::new(AbortReason::AllBackendsFailed, total_attempts, trail)
            .with_last_error(last_error);
        Err(self.abort(request, abort))
    }

    fn transport(&self, backend_id: &str) -> Option<ArcTransport> {
        self.transports.get(backend_id).map(|t| Arc::clone(t.value()))
    }

    async fn call(
        &self,
        transport: &ArcTransport,
        request: &DispatchRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => CallOutcome::Cancelled,
            result = tokio::time::timeout(timeout, transport.call(request, timeout)) => match result {
                Ok(Ok(output)) => CallOutcome::Served(output),
                Ok(Err(failure)) => CallOutcome::Failed(failure),
                Err(_) => CallOutcome::Failed(BackendFailure::timeout(timeout)),
            },
        }
    }

    fn abort(&self, request: &DispatchRequest, abort: DispatchAbort) -> DispatchAbort {
        self.metrics.record_abort();
        tracing::warn!(
            request_id = %request.id,
            reason = %abort.reason,
            attempts = abort.attempts,
            "Dispatch aborted"
        );
        audit::emit_dispatch_aborted(request, &abort);
        abort
    }
}

impl fmt::Debug for ResilientDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientDispatcher")
            .field("transports", &self.transports.len())
            .field("defaults", &self.defaults)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl Default for ResilientDispatcher {
    /// A dispatcher with default settings whose transports are all
    /// registered later through [`ResilientDispatcher::set_transport`].
    fn default() -> Self {
        Self {
            transports: DashMap::new(),
            breaker: Arc::new(CircuitBreaker::with_defaults()),
            config: Arc::new(LayeredConfig::new()),
            defaults: EffectiveSettings::default(),
            classifier: ErrorClassifier::default(),
            backoff: BackoffPolicy::default(),
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }
}

fn skipped(backend_id: &str) -> CandidateAttempt {
    CandidateAttempt {
        backend_id: backend_id.to_string(),
        attempts: 0,
        last_category: None,
        skipped: true,
    }
}

fn with_unit(error: ClassifiedError, request: &DispatchRequest) -> ClassifiedError {
    match &request.unit_id {
        Some(unit) => error.with_unit(unit.clone()),
        None => error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockOutcome, MockTransport};
    use crate::registry::BackendRegistry;
    use crate::selector::CandidateSelector;
    use serde_json::json;

    fn backend(id: &str, priority: i32) -> Arc<Backend> {
        Arc::new(Backend::new(id).with_capability("search").with_priority(priority))
    }

    fn request() -> DispatchRequest {
        DispatchRequest::new("search", json!({"q": "rust"}))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_over_to_third_candidate() {
        let a = Arc::new(MockTransport::failing(BackendFailure::connection("refused")));
        let b = Arc::new(MockTransport::failing(BackendFailure::connection("refused")));
        let c = Arc::new(MockTransport::responding(json!({"hits": 3})));

        let breaker = Arc::new(CircuitBreaker::with_defaults());
        let dispatcher = ResilientDispatcher::builder()
            .add_arc_transport("a", a.clone())
            .add_arc_transport("b", b.clone())
            .add_arc_transport("c", c.clone())
            .with_breaker(breaker.clone())
            .build()
            .unwrap();

        let candidates = [backend("a", 10), backend("b", 5), backend("c", 1)];
        let response = dispatcher
            .dispatch(&request().with_max_retries(0), &candidates)
            .await
            .unwrap();

        assert_eq!(response.backend_id, "c");
        assert_eq!(response.attempts, 3);
        assert_eq!(response.output, json!({"hits": 3}));
        assert_eq!(response.trail.len(), 3);
        assert_eq!(response.trail[0].last_category, Some(ErrorCategory::Connection));
        assert_eq!(breaker.consecutive_failures("a"), 1);
        assert_eq!(breaker.consecutive_failures("b"), 1);
        assert_eq!(breaker.consecutive_failures("c"), 0);
        assert_eq!(c.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_after_repeated_timeouts() {
        let registry = Arc::new(BackendRegistry::new());
        registry.register(Backend::new("slow").with_capability("search"));
        registry.heartbeat("slow").unwrap();

        let breaker = Arc::new(CircuitBreaker::with_defaults());
        let selector = CandidateSelector::new(registry.clone(), breaker.clone()).with_health_check(false);
        let transport = Arc::new(MockTransport::hanging());
        let dispatcher = ResilientDispatcher::builder()
            .add_arc_transport("slow", transport.clone())
            .with_breaker(breaker.clone())
            .build()
            .unwrap();

        let req = request()
            .with_max_retries(0)
            .with_timeout(Duration::from_millis(100));

        for _ in 0..5 {
            let candidates = selector.select(&req);
            assert_eq!(candidates.len(), 1);
            let abort = dispatcher.dispatch(&req, &candidates).await.unwrap_err();
            assert_eq!(abort.reason, AbortReason::AllBackendsFailed);
            assert_eq!(abort.last_error.unwrap().category, ErrorCategory::Timeout);
        }
        assert!(breaker.is_open("slow"));
        assert_eq!(transport.call_count(), 5);

        tokio::time::advance(Duration::from_secs(10)).await;
        let candidates = selector.select(&req);
        assert!(candidates.is_empty());
        let abort = dispatcher.dispatch(&req, &candidates).await.unwrap_err();
        assert_eq!(abort.reason, AbortReason::NoBackendAvailable);
        assert_eq!(transport.call_count(), 5);

        tokio::time::advance(Duration::from_secs(21)).await;
        let candidates = selector.select(&req);
        assert_eq!(candidates.len(), 1);
        let _ = dispatcher.dispatch(&req, &candidates).await;
        assert_eq!(transport.call_count(), 6);
        // The half-open probe failed, so the circuit is open again.
        assert!(breaker.is_open("slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_same_candidate() {
        let transport = Arc::new(
            MockTransport::responding(json!("ok"))
                .then(MockOutcome::Fail(BackendFailure::rate_limited(None))),
        );
        let dispatcher = ResilientDispatcher::builder()
            .add_arc_transport("a", transport.clone())
            .build()
            .unwrap();

        let started = Instant::now();
        let response = dispatcher
            .dispatch(&request().with_max_retries(1), &[backend("a", 0), backend("b", 0)])
            .await
            .unwrap();

        assert_eq!(response.backend_id, "a");
        assert_eq!(response.attempts, 2);
        assert_eq!(transport.call_count(), 2);
        // Rate-limit backoff defaults to one second.
        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert_eq!(dispatcher.breaker().consecutive_failures("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_falls_through_immediately() {
        let a = Arc::new(MockTransport::failing(BackendFailure::invalid_input("bad query")));
        let dispatcher = ResilientDispatcher::builder()
            .add_arc_transport("a", a.clone())
            .add_transport("b", MockTransport::new())
            .build()
            .unwrap();

        let response = dispatcher
            .dispatch(&request().with_max_retries(3), &[backend("a", 1), backend("b", 0)])
            .await
            .unwrap();

        assert_eq!(response.backend_id, "b");
        assert_eq!(a.call_count(), 1);
        // Validation failures are ignored by the default failure policy.
        assert_eq!(dispatcher.breaker().consecutive_failures("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_counts_once() {
        let a = Arc::new(MockTransport::failing(BackendFailure::connection("reset")));
        let dispatcher = ResilientDispatcher::builder()
            .add_arc_transport("a", a.clone())
            .build()
            .unwrap();

        let abort = dispatcher
            .dispatch(&request().with_max_retries(2), &[backend("a", 0)])
            .await
            .unwrap_err();

        assert_eq!(abort.reason, AbortReason::AllBackendsFailed);
        assert_eq!(abort.attempts, 3);
        assert_eq!(a.call_count(), 3);
        assert_eq!(dispatcher.breaker().consecutive_failures("a"), 1);
        let last = abort.last_error.unwrap();
        assert_eq!(last.attempt, 3);
        assert_eq!(last.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_disabled_backend_skipped() {
        let config = LayeredConfig::new();
        config.set("backends.a.disabled", true);

        let a = Arc::new(MockTransport::new());
        let dispatcher = ResilientDispatcher::builder()
            .add_arc_transport("a", a.clone())
            .add_transport("b", MockTransport::new())
            .with_config(Arc::new(config))
            .build()
            .unwrap();

        let response = dispatcher
            .dispatch(&request(), &[backend("a", 1), backend("b", 0)])
            .await
            .unwrap();

        assert_eq!(response.backend_id, "b");
        assert_eq!(response.attempts, 1);
        assert!(response.trail[0].skipped);
        assert_eq!(a.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let dispatcher = ResilientDispatcher::default();
        let abort = dispatcher.dispatch(&request(), &[]).await.unwrap_err();
        assert_eq!(abort.reason, AbortReason::NoBackendAvailable);
        assert_eq!(abort.attempts, 0);
        assert!(abort.last_error.is_none());
        assert_eq!(dispatcher.metrics().snapshot().aborts, 1);
    }

    #[tokio::test]
    async fn test_missing_transport_falls_through() {
        let dispatcher = ResilientDispatcher::builder()
            .add_transport("b", MockTransport::new())
            .build()
            .unwrap();

        let response = dispatcher
            .dispatch(&request(), &[backend("a", 1), backend("b", 0)])
            .await
            .unwrap();
        assert_eq!(response.backend_id, "b");
        assert_eq!(response.trail[0].last_category, Some(ErrorCategory::Configuration));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_dispatch() {
        let transport = Arc::new(MockTransport::hanging());
        let dispatcher = Arc::new(
            ResilientDispatcher::builder()
                .add_arc_transport("a", transport.clone())
                .build()
                .unwrap(),
        );

        let cancel = CancellationToken::new();
        let task = {
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let req = request().with_timeout(Duration::from_secs(60));
                dispatcher.dispatch_with_cancel(&req, &[backend("a", 0)], &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let abort = task.await.unwrap().unwrap_err();
        assert!(abort.is_cancelled());
        assert_eq!(abort.attempts, 1);
        assert_eq!(dispatcher.breaker().consecutive_failures("a"), 0);
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let dispatcher = ResilientDispatcher::builder()
            .add_transport("a", MockTransport::failing(BackendFailure::connection("down")))
            .add_transport("b", MockTransport::new())
            .build()
            .unwrap();

        dispatcher
            .dispatch(&request().with_max_retries(0), &[backend("a", 1), backend("b", 0)])
            .await
            .unwrap();

        let snapshot = dispatcher.metrics().snapshot();
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.successes, 1);
    }

    #[test]
    fn test_build_rejects_zero_timeout() {
        let result = ResilientDispatcher::builder()
            .with_defaults(EffectiveSettings::default().with_timeout(Duration::ZERO))
            .build();
        assert!(matches!(result, Err(DispatchError::Configuration { .. })));
    }
}
