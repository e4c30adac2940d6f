//! Audit event emission functions.

use crate::classify::ClassifiedError;
use crate::core::{DispatchRequest, DispatchResponse, RequestContext};
use crate::dispatch::DispatchAbort;
use crate::lifecycle::LifecycleStage;
use crate::recovery::RecoveryDecision;

use std::time::Duration;

/// Emits an audit event for a dispatch that was served.
pub fn emit_dispatch_completed(request: &DispatchRequest, response: &DispatchResponse) {
    tracing::info!(
        target: "routeguard::audit",
        event_type = "dispatch_completed",
        request_id = %request.id,
        capability = %request.capability,
        backend_id = %response.backend_id,
        attempts = response.attempts,
        candidates_tried = response.trail.len(),
        elapsed_ms = response.elapsed.as_millis() as u64,
        tenant_id = ?request.context.tenant_id,
        run_id = ?request.context.run_id,
        correlation_id = ?request.context.correlation_id,
        "Dispatch completed"
    );
}

/// Emits an audit event for a dispatch that gave up.
pub fn emit_dispatch_aborted(request: &DispatchRequest, abort: &DispatchAbort) {
    tracing::info!(
        target: "routeguard::audit",
        event_type = "dispatch_aborted",
        request_id = %request.id,
        capability = %request.capability,
        reason = %abort.reason,
        attempts = abort.attempts,
        last_category = ?abort.last_error.as_ref().map(|e| e.category.as_str()),
        last_message = ?abort.last_error.as_ref().map(|e| e.message.as_str()),
        tenant_id = ?request.context.tenant_id,
        run_id = ?request.context.run_id,
        correlation_id = ?request.context.correlation_id,
        "Dispatch aborted"
    );
}

/// Emits an audit event for a classified error.
pub fn emit_error_classified(error: &ClassifiedError, unit_id: Option<&str>, context: &RequestContext) {
    tracing::info!(
        target: "routeguard::audit",
        event_type = "error_classified",
        category = %error.category,
        message = %error.message,
        retryable = error.retryable,
        attempt = error.attempt,
        max_attempts = error.max_attempts,
        backend_id = ?error.backend_id,
        unit_id = ?unit_id,
        suggested_action = ?error.suggested_action.map(|a| a.as_str()),
        tenant_id = ?context.tenant_id,
        run_id = ?context.run_id,
        correlation_id = ?context.correlation_id,
        "Error classified"
    );
}

/// Emits an audit event for a recovery decision.
pub fn emit_recovery_decision(
    error: &ClassifiedError,
    decision: &RecoveryDecision,
    context: &RequestContext,
) {
    tracing::info!(
        target: "routeguard::audit",
        event_type = "recovery_decision",
        action = %decision.action,
        reason = %decision.reason,
        matched_rule_id = ?decision.matched_rule_id,
        category = %error.category,
        backend_id = ?error.backend_id,
        unit_id = ?error.unit_id,
        tenant_id = ?context.tenant_id,
        run_id = ?context.run_id,
        correlation_id = ?context.correlation_id,
        "Recovery decision made"
    );
}

/// Emits an audit event for a circuit opening.
pub fn emit_breaker_opened(backend_id: &str, cool_down: Duration, reopened: bool) {
    tracing::info!(
        target: "routeguard::audit",
        event_type = "breaker_opened",
        backend_id = %backend_id,
        cool_down_ms = cool_down.as_millis() as u64,
        reopened,
        "Circuit breaker opened"
    );
}

/// Emits an audit event for an executable unit changing stage.
pub fn emit_lifecycle_transition(unit_id: &str, from: LifecycleStage, to: LifecycleStage) {
    tracing::info!(
        target: "routeguard::audit",
        event_type = "lifecycle_transition",
        unit_id = %unit_id,
        from = %from,
        to = %to,
        "Lifecycle transition"
    );
}
