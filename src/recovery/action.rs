//! Recovery actions and decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The next step chosen for a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryAction {
    /// Try the same operation again.
    Retry,
    /// Hand the failure to the self-healer and re-run with the repaired input.
    AutoFix,
    /// Stop and wait for a human.
    HumanReview,
    /// Re-target the request to the configured fallback.
    Fallback,
    /// Give up.
    Abort,
}

impl RecoveryAction {
    /// All actions, in declaration order.
    pub const ALL: [RecoveryAction; 5] = [
        Self::Retry,
        Self::AutoFix,
        Self::HumanReview,
        Self::Fallback,
        Self::Abort,
    ];

    /// Returns the wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "RETRY",
            Self::AutoFix => "AUTO_FIX",
            Self::HumanReview => "HUMAN_REVIEW",
            Self::Fallback => "FALLBACK",
            Self::Abort => "ABORT",
        }
    }

    /// Returns true if the action ends automatic processing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::HumanReview | Self::Abort)
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The orchestrator's verdict on one error.
///
/// Produced fresh per error and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryDecision {
    /// The action to take.
    pub action: RecoveryAction,

    /// Why this action was chosen.
    pub reason: String,

    /// Additional context about the decision.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// ID of the custom rule that matched, if any.
    pub matched_rule_id: Option<String>,

    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
}

impl RecoveryDecision {
    /// Creates a new decision.
    pub fn new(action: RecoveryAction, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
            metadata: HashMap::new(),
            matched_rule_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Sets the matched rule ID.
    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.matched_rule_id = Some(rule_id.into());
        self
    }
}
