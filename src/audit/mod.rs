//! Structured audit logging.
//!
//! This module provides functions for emitting structured audit events
//! using the `tracing` crate on the `routeguard::audit` target, plus the
//! [`AuditSink`] interface the recovery orchestrator reports through.
//! Events can be captured by any tracing subscriber (JSON file,
//! OpenTelemetry, etc.).

mod events;
mod sink;

pub use events::{
    emit_breaker_opened, emit_dispatch_aborted, emit_dispatch_completed, emit_error_classified,
    emit_lifecycle_transition, emit_recovery_decision,
};
pub use sink::{AuditEntry, AuditSink, MemoryAuditSink, TracingAuditSink};
