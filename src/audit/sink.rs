//! The audit/provenance sink collaborator.

use crate::audit::events::{emit_error_classified, emit_recovery_decision};
use crate::classify::ClassifiedError;
use crate::core::RequestContext;
use crate::recovery::RecoveryDecision;

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Mutex;

/// Receives classified errors and recovery decisions.
///
/// Calls are fire-and-forget and sit on the dispatch path, so
/// implementations must not do more than a bounded append. Anything slower
/// belongs behind a channel.
pub trait AuditSink: Send + Sync + Debug {
    /// Records a classified error.
    fn log_error(&self, error: &ClassifiedError, unit_id: Option<&str>, context: &RequestContext);

    /// Records a recovery decision taken for `error`.
    fn log_decision(
        &self,
        error: &ClassifiedError,
        decision: &RecoveryDecision,
        context: &RequestContext,
    );
}

/// Writes audit records as `tracing` events on the `routeguard::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_error(&self, error: &ClassifiedError, unit_id: Option<&str>, context: &RequestContext) {
        emit_error_classified(error, unit_id, context);
    }

    fn log_decision(
        &self,
        error: &ClassifiedError,
        decision: &RecoveryDecision,
        context: &RequestContext,
    ) {
        emit_recovery_decision(error, decision, context);
    }
}

/// A record kept by [`MemoryAuditSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    /// A classified error.
    Error {
        /// The error.
        error: ClassifiedError,
        /// Unit the error occurred on.
        unit_id: Option<String>,
        /// Request context.
        context: RequestContext,
    },
    /// A recovery decision.
    Decision {
        /// The error decided on.
        error: ClassifiedError,
        /// The decision.
        decision: RecoveryDecision,
        /// Request context.
        context: RequestContext,
    },
}

/// Keeps audit records in memory. Useful for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    /// Returns the recorded decisions, oldest first.
    pub fn decisions(&self) -> Vec<RecoveryDecision> {
        self.lock()
            .iter()
            .filter_map(|entry| match entry {
                AuditEntry::Decision { decision, .. } => Some(decision.clone()),
                AuditEntry::Error { .. } => None,
            })
            .collect()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditSink for MemoryAuditSink {
    fn log_error(&self, error: &ClassifiedError, unit_id: Option<&str>, context: &RequestContext) {
        self.lock().push(AuditEntry::Error {
            error: error.clone(),
            unit_id: unit_id.map(str::to_string),
            context: context.clone(),
        });
    }

    fn log_decision(
        &self,
        error: &ClassifiedError,
        decision: &RecoveryDecision,
        context: &RequestContext,
    ) {
        self.lock().push(AuditEntry::Decision {
            error: error.clone(),
            decision: decision.clone(),
            context: context.clone(),
        });
    }
}
