//! End-to-end request handling: selection, dispatch and recovery.

use crate::classify::{ClassifiedError, ErrorCategory};
use crate::core::{DispatchError, DispatchRequest, DispatchResponse};
use crate::dispatch::dispatcher::{DispatchAbort, ResilientDispatcher};
use crate::lifecycle::{LifecycleStateMachine, UnitDescriptor};
use crate::recovery::{
    ExecutionHistory, FallbackTarget, HealingFailure, NoopHealer, RecoveryAction,
    RecoveryDecision, RecoveryOrchestrator, RecoveryPolicy, SelfHealer,
};
use crate::selector::CandidateSelector;

use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default number of dispatch rounds counted against an error's attempts.
pub const DEFAULT_GATEWAY_ATTEMPTS: u32 = 2;

/// Default upper bound on dispatch rounds for one request.
pub const DEFAULT_MAX_ROUNDS: u32 = 5;

/// Terminal outcomes of [`Gateway::execute`] other than a response.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The orchestrator escalated the failure to a human.
    #[error("escalated for human review: {}", .decision.reason)]
    Escalated {
        /// The error that was escalated.
        error: ClassifiedError,
        /// The decision that escalated it.
        decision: RecoveryDecision,
    },

    /// Recovery gave up.
    #[error("aborted: {}", .decision.reason)]
    Aborted {
        /// The abort decision.
        decision: RecoveryDecision,
        /// The last dispatch outcome.
        abort: DispatchAbort,
    },

    /// The caller cancelled the request.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Backend calls made before cancellation.
        attempts: u32,
    },

    /// The self-healer could not repair the request.
    #[error("auto-fix failed for {}: {source}", .error.category)]
    HealingFailed {
        /// The healer's failure.
        #[source]
        source: HealingFailure,
        /// The error the healer was asked to repair.
        error: ClassifiedError,
    },

    /// Recovery kept asking for another round past the limit.
    #[error("gave up after {rounds} dispatch rounds")]
    RoundsExhausted {
        /// Rounds run.
        rounds: u32,
        /// The last error seen.
        error: ClassifiedError,
    },

    /// The request's unit could not be admitted.
    #[error(transparent)]
    Lifecycle(#[from] DispatchError),
}

impl GatewayError {
    /// Returns the recovery decision behind this outcome, if one was made.
    pub fn decision(&self) -> Option<&RecoveryDecision> {
        match self {
            Self::Escalated { decision, .. } | Self::Aborted { decision, .. } => Some(decision),
            _ => None,
        }
    }
}

/// Runs requests through selection, dispatch and recovery.
///
/// Each round selects candidates and dispatches. When a round aborts, the
/// failure is handed to the [`RecoveryOrchestrator`] with the gateway round
/// as its attempt counter, and the decision is carried out:
///
/// - `RETRY` runs another round with fresh selection.
/// - `AUTO_FIX` asks the [`SelfHealer`] for a repaired request and runs it.
/// - `FALLBACK` re-targets the request once to the policy's fallback.
/// - `HUMAN_REVIEW` and `ABORT` end the request.
///
/// If the request names a unit and a [`LifecycleStateMachine`] is attached,
/// the unit is created and loaded on first use, held in EXECUTING while the
/// request runs, and returned to IDLE afterwards.
#[derive(Debug)]
pub struct Gateway {
    selector: CandidateSelector,
    dispatcher: Arc<ResilientDispatcher>,
    orchestrator: RecoveryOrchestrator,
    policy: RecoveryPolicy,
    healer: Arc<dyn SelfHealer>,
    lifecycle: Option<Arc<LifecycleStateMachine>>,
    max_attempts: u32,
    max_rounds: u32,
}

impl Gateway {
    /// Creates a gateway with the default policy and no healer.
    pub fn new(selector: CandidateSelector, dispatcher: Arc<ResilientDispatcher>) -> Self {
        let orchestrator = RecoveryOrchestrator::new(Arc::clone(selector.breaker()))
            .with_metrics(Arc::clone(dispatcher.metrics()));
        Self {
            selector,
            dispatcher,
            orchestrator,
            policy: RecoveryPolicy::default(),
            healer: Arc::new(NoopHealer),
            lifecycle: None,
            max_attempts: DEFAULT_GATEWAY_ATTEMPTS,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Sets the recovery orchestrator.
    pub fn with_orchestrator(mut self, orchestrator: RecoveryOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Sets the recovery policy.
    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the self-healer used for AUTO_FIX.
    pub fn with_healer(mut self, healer: Arc<dyn SelfHealer>) -> Self {
        self.healer = healer;
        self
    }

    /// Attaches a lifecycle state machine for unit admission.
    pub fn with_lifecycle(mut self, lifecycle: Arc<LifecycleStateMachine>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Sets how many rounds an error may take before it stops being retryable.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the hard cap on rounds per request.
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    /// Returns the recovery policy.
    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Arc<ResilientDispatcher> {
        &self.dispatcher
    }

    /// Executes a request without a cancellation signal.
    pub async fn execute(
        &self,
        request: &DispatchRequest,
        history: &mut ExecutionHistory,
    ) -> Result<DispatchResponse, GatewayError> {
        self.execute_with_cancel(request, history, &CancellationToken::new())
            .await
    }

    /// Executes a request, recording errors and decisions in `history`.
    pub async fn execute_with_cancel(
        &self,
        request: &DispatchRequest,
        history: &mut ExecutionHistory,
        cancel: &CancellationToken,
    ) -> Result<DispatchResponse, GatewayError> {
        let unit_id = request.unit_id.clone();
        if let Some(unit) = unit_id.as_deref() {
            self.admit(unit, request).await?;
        }

        let result = self.run(request.clone(), history, cancel).await;

        if let Some(unit) = unit_id.as_deref() {
            self.release(unit, &result).await;
        }
        result
    }

    async fn run(
        &self,
        mut request: DispatchRequest,
        history: &mut ExecutionHistory,
        cancel: &CancellationToken,
    ) -> Result<DispatchResponse, GatewayError> {
        let mut attempts = 0u32;
        let mut fell_back = false;
        let mut last_error = None;

        for round in 1..=self.max_rounds {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled { attempts });
            }

            let candidates = self.selector.select(&request);
            let abort = match self
                .dispatcher
                .dispatch_with_cancel(&request, &candidates, cancel)
                .await
            {
                Ok(response) => return Ok(response),
                Err(abort) => abort,
            };

            attempts += abort.attempts;
            if abort.is_cancelled() {
                return Err(GatewayError::Cancelled { attempts });
            }

            let error = round_error(&request, &abort).with_attempts(round, self.max_attempts);
            let decision = self
                .orchestrator
                .handle(&error, &self.policy, history, &request.context);

            tracing::debug!(
                request_id = %request.id,
                round,
                action = %decision.action,
                "Acting on recovery decision"
            );

            match decision.action {
                RecoveryAction::Retry => {}
                RecoveryAction::AutoFix => {
                    match self.healer.heal(request.unit_id.as_deref(), &request, &error).await {
                        Ok(healed) => {
                            tracing::info!(request_id = %request.id, "Request healed, re-dispatching");
                            request = healed;
                        }
                        Err(source) => return Err(GatewayError::HealingFailed { source, error }),
                    }
                }
                RecoveryAction::Fallback => match &self.policy.fallback {
                    Some(target) if !fell_back => {
                        tracing::info!(
                            request_id = %request.id,
                            capability = ?target.capability,
                            backends = ?target.backends,
                            "Falling back"
                        );
                        request = retarget(request, target);
                        fell_back = true;
                    }
                    _ => {
                        let decision = RecoveryDecision::new(
                            RecoveryAction::Abort,
                            "fallback already attempted",
                        );
                        return Err(GatewayError::Aborted { decision, abort });
                    }
                },
                RecoveryAction::HumanReview => {
                    return Err(GatewayError::Escalated { error, decision });
                }
                RecoveryAction::Abort => {
                    return Err(GatewayError::Aborted { decision, abort });
                }
            }

            last_error = Some(error);
        }

        let error = last_error.unwrap_or_else(|| {
            ClassifiedError::new(ErrorCategory::Unknown, "no dispatch round completed")
        });
        Err(GatewayError::RoundsExhausted {
            rounds: self.max_rounds,
            error,
        })
    }

    async fn admit(&self, unit: &str, request: &DispatchRequest) -> Result<(), GatewayError> {
        let Some(lifecycle) = &self.lifecycle else {
            return Ok(());
        };

        lifecycle
            .admit(unit, UnitDescriptor::new(request.capability.clone()))
            .await?;
        Ok(())
    }

    async fn release(&self, unit: &str, result: &Result<DispatchResponse, GatewayError>) {
        let Some(lifecycle) = &self.lifecycle else {
            return;
        };

        if let Err(e) = result {
            if let Err(err) = lifecycle.record_failure(unit, e.to_string()).await {
                tracing::warn!(unit, error = %err, "Failed to record unit failure");
            }
        }
        if let Err(err) = lifecycle.mark_idle(unit).await {
            tracing::warn!(unit, error = %err, "Failed to return unit to idle");
        }
    }
}

/// The error handed to the orchestrator for an aborted round.
///
/// An empty candidate list has no backend error, so it is reported as a
/// non-retryable RESOURCE error.
fn round_error(request: &DispatchRequest, abort: &DispatchAbort) -> ClassifiedError {
    let error = match &abort.last_error {
        Some(error) => error.clone(),
        None => {
            let error = ClassifiedError::new(
                ErrorCategory::Resource,
                format!("no backend available for capability '{}'", request.capability),
            )
            .with_retryable(false);
            match &request.unit_id {
                Some(unit) => error.with_unit(unit.clone()),
                None => error,
            }
        }
    };
    error.with_detail("abort_reason", json!(abort.reason.as_str()))
}

fn retarget(mut request: DispatchRequest, target: &FallbackTarget) -> DispatchRequest {
    if let Some(capability) = &target.capability {
        request.capability = capability.clone();
    }
    request.pinned_backends = target.backends.clone();
    request
}
