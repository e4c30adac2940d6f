//! The recovery orchestrator.

use crate::audit::{AuditSink, TracingAuditSink};
use crate::circuit_breaker::CircuitBreaker;
use crate::classify::{ClassifiedError, ErrorCategory};
use crate::core::RequestContext;
use crate::metrics::DispatchMetrics;
use crate::recovery::action::{RecoveryAction, RecoveryDecision};
use crate::recovery::history::ExecutionHistory;
use crate::recovery::policy::RecoveryPolicy;

use serde_json::json;
use std::sync::Arc;

/// Decides what to do about a classified error.
///
/// Checks run in a fixed order and the first that applies wins:
///
/// 1. SECURITY errors always go to human review.
/// 2. An open breaker on the originating backend aborts.
/// 3. Custom rules, by descending priority.
/// 4. Retry, if the error is retryable and attempts remain.
/// 5. Auto-fix, if enabled and the error is eligible.
/// 6. Human review, once attempt or run-wide error thresholds are reached.
/// 7. Fallback, if the policy names a target.
/// 8. Abort.
#[derive(Debug, Clone)]
pub struct RecoveryOrchestrator {
    breaker: Arc<CircuitBreaker>,
    audit: Arc<dyn AuditSink>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl RecoveryOrchestrator {
    /// Creates an orchestrator that audits through `tracing`.
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            breaker,
            audit: Arc::new(TracingAuditSink),
            metrics: None,
        }
    }

    /// Sets the audit sink.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Sets the metrics the decision histogram is written to.
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Decides on an error without side effects beyond logging.
    pub fn decide(
        &self,
        error: &ClassifiedError,
        policy: &RecoveryPolicy,
        history: &ExecutionHistory,
    ) -> RecoveryDecision {
        let decision = self.evaluate(error, policy, history);
        tracing::info!(
            action = %decision.action,
            reason = %decision.reason,
            category = %error.category,
            backend = ?error.backend_id,
            "Recovery decision"
        );
        decision
    }

    /// Records the error, decides, and reports both to the audit sink.
    ///
    /// The error is counted in `history` before the decision is made, so the
    /// run-wide escalation threshold includes it.
    pub fn handle(
        &self,
        error: &ClassifiedError,
        policy: &RecoveryPolicy,
        history: &mut ExecutionHistory,
        context: &RequestContext,
    ) -> RecoveryDecision {
        history.record_error(error);
        self.audit.log_error(error, error.unit_id.as_deref(), context);

        let decision = self.decide(error, policy, history);

        self.audit.log_decision(error, &decision, context);
        history.record_decision(error, &decision);
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision.action);
        }
        decision
    }

    fn evaluate(
        &self,
        error: &ClassifiedError,
        policy: &RecoveryPolicy,
        history: &ExecutionHistory,
    ) -> RecoveryDecision {
        if error.category == ErrorCategory::Security {
            return RecoveryDecision::new(
                RecoveryAction::HumanReview,
                "security errors always require human review",
            );
        }

        if let Some(backend) = &error.backend_id {
            if self.breaker.is_open(backend) {
                return RecoveryDecision::new(RecoveryAction::Abort, "circuit breaker is open")
                    .with_metadata("backend_id", json!(backend));
            }
        }

        if let Some(rule) = policy.rules().iter().find(|r| r.matches(error, history)) {
            tracing::debug!(rule_id = %rule.id, rule_name = %rule.name, "Recovery rule matched");
            return RecoveryDecision::new(rule.action, format!("matched rule '{}'", rule.id))
                .with_rule(rule.id.clone());
        }

        if error.can_retry() {
            return RecoveryDecision::new(RecoveryAction::Retry, "error is retryable")
                .with_metadata("attempt", json!(error.attempt))
                .with_metadata("max_attempts", json!(error.max_attempts));
        }

        if policy.auto_fix_enabled {
            if matches!(error.category, ErrorCategory::Validation | ErrorCategory::External) {
                return RecoveryDecision::new(
                    RecoveryAction::AutoFix,
                    format!("{} errors are eligible for auto-fix", error.category),
                );
            }
            if policy.trust_suggested_actions
                && error.suggested_action == Some(RecoveryAction::AutoFix)
            {
                return RecoveryDecision::new(RecoveryAction::AutoFix, "backend suggested auto-fix")
                    .with_metadata("suggested", json!(true));
            }
        }

        if error.attempt >= policy.escalation_attempt_threshold {
            return RecoveryDecision::new(
                RecoveryAction::HumanReview,
                format!("attempt {} reached escalation threshold", error.attempt),
            );
        }

        if history.error_count() >= policy.escalation_error_threshold {
            return RecoveryDecision::new(
                RecoveryAction::HumanReview,
                format!("run has seen {} errors", history.error_count()),
            );
        }

        if let Some(fallback) = &policy.fallback {
            return RecoveryDecision::new(RecoveryAction::Fallback, "fallback target configured")
                .with_metadata("capability", json!(fallback.capability))
                .with_metadata("backends", json!(fallback.backends));
        }

        RecoveryDecision::new(RecoveryAction::Abort, "no recovery available")
    }
}
