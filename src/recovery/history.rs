//! Per-run execution history.

use crate::classify::{ClassifiedError, ErrorCategory};
use crate::recovery::action::{RecoveryAction, RecoveryDecision};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry in the decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Category of the error that was decided on.
    pub category: ErrorCategory,
    /// Backend the error came from.
    pub backend_id: Option<String>,
    /// Chosen action.
    pub action: RecoveryAction,
    /// Reason for the action.
    pub reason: String,
    /// Custom rule that matched, if any.
    pub matched_rule_id: Option<String>,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
}

/// Errors and decisions accumulated over one workflow run.
///
/// Read by custom rules and by the escalation thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistory {
    /// Run this history belongs to.
    pub run_id: Option<String>,
    total_errors: u32,
    errors_by_unit: HashMap<String, u32>,
    errors_by_category: HashMap<ErrorCategory, u32>,
    decisions: Vec<DecisionRecord>,
}

impl ExecutionHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty history for a run.
    pub fn for_run(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..Self::default()
        }
    }

    /// Counts an error.
    pub fn record_error(&mut self, error: &ClassifiedError) {
        self.total_errors += 1;
        *self.errors_by_category.entry(error.category).or_default() += 1;
        if let Some(unit) = &error.unit_id {
            *self.errors_by_unit.entry(unit.clone()).or_default() += 1;
        }
    }

    /// Appends a decision to the log.
    pub fn record_decision(&mut self, error: &ClassifiedError, decision: &RecoveryDecision) {
        self.decisions.push(DecisionRecord {
            category: error.category,
            backend_id: error.backend_id.clone(),
            action: decision.action,
            reason: decision.reason.clone(),
            matched_rule_id: decision.matched_rule_id.clone(),
            timestamp: decision.timestamp,
        });
    }

    /// Cumulative error count for the run.
    pub fn error_count(&self) -> u32 {
        self.total_errors
    }

    /// Errors recorded against one executable unit.
    pub fn unit_error_count(&self, unit_id: &str) -> u32 {
        self.errors_by_unit.get(unit_id).copied().unwrap_or(0)
    }

    /// Errors recorded for one category.
    pub fn category_count(&self, category: ErrorCategory) -> u32 {
        self.errors_by_category.get(&category).copied().unwrap_or(0)
    }

    /// The decision log, oldest first.
    pub fn decisions(&self) -> &[DecisionRecord] {
        &self.decisions
    }

    /// Number of times `action` was chosen.
    pub fn action_count(&self, action: RecoveryAction) -> usize {
        self.decisions.iter().filter(|d| d.action == action).count()
    }
}
