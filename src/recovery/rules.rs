//! Declarative recovery rules and conditions.

use crate::classify::{ClassifiedError, ErrorCategory};
use crate::recovery::action::RecoveryAction;
use crate::recovery::history::ExecutionHistory;

use serde::{Deserialize, Serialize};

/// A rule that matches certain errors and produces a recovery action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRule {
    /// Unique identifier for this rule.
    pub id: String,

    /// Human-readable name for the rule.
    #[serde(default)]
    pub name: String,

    /// Description of what this rule does.
    #[serde(default)]
    pub description: Option<String>,

    /// Conditions that must all match for this rule to apply.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Action to take when all conditions match.
    pub action: RecoveryAction,

    /// Priority of the rule (higher = evaluated first).
    #[serde(default)]
    pub priority: i32,

    /// Whether this rule is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RecoveryRule {
    /// Creates a new rule with no conditions.
    pub fn new(id: impl Into<String>, action: RecoveryAction) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: None,
            conditions: Vec::new(),
            action,
            priority: 0,
            enabled: true,
        }
    }

    /// Sets the name of the rule.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Enables or disables the rule.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Evaluates whether this rule matches the error and history.
    ///
    /// A rule with no conditions never matches; use [`Condition::Always`]
    /// for a catch-all.
    pub fn matches(&self, error: &ClassifiedError, history: &ExecutionHistory) -> bool {
        if !self.enabled || self.conditions.is_empty() {
            return false;
        }

        self.conditions.iter().all(|c| c.matches(error, history))
    }
}

/// A predicate over a classified error and the run's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Matches a single category.
    CategoryIs {
        /// The category to match.
        category: ErrorCategory,
    },

    /// Matches any of the listed categories.
    CategoryIn {
        /// Categories to match.
        categories: Vec<ErrorCategory>,
    },

    /// Matches on the retryable flag.
    RetryableIs {
        /// Expected value.
        retryable: bool,
    },

    /// Matches if the error's attempt counter is at least `attempt`.
    AttemptAtLeast {
        /// Minimum attempt.
        attempt: u32,
    },

    /// Matches if the message contains a substring (case-insensitive).
    MessageContains {
        /// Substring to search for.
        substring: String,
    },

    /// Matches the originating backend.
    BackendEquals {
        /// Backend id.
        backend_id: String,
    },

    /// Matches if a detail entry equals a value.
    DetailEquals {
        /// Detail key.
        key: String,
        /// Expected value.
        value: serde_json::Value,
    },

    /// Matches if the run has seen at least `count` errors.
    ErrorCountAtLeast {
        /// Minimum error count.
        count: u32,
    },

    /// Matches the backend-suggested action.
    SuggestedActionIs {
        /// Action to match.
        action: RecoveryAction,
    },

    /// Always matches.
    Always,

    /// Never matches.
    Never,

    /// Logical AND of multiple conditions.
    And {
        /// Conditions that must all match.
        conditions: Vec<Condition>,
    },

    /// Logical OR of multiple conditions.
    Or {
        /// Conditions where at least one must match.
        conditions: Vec<Condition>,
    },

    /// Logical NOT of a condition.
    Not {
        /// Condition to negate.
        condition: Box<Condition>,
    },
}

impl Condition {
    /// Creates a condition that matches one category.
    pub fn category_is(category: ErrorCategory) -> Self {
        Self::CategoryIs { category }
    }

    /// Creates a condition that matches several categories.
    pub fn category_in(categories: impl IntoIterator<Item = ErrorCategory>) -> Self {
        Self::CategoryIn {
            categories: categories.into_iter().collect(),
        }
    }

    /// Creates a condition on the originating backend.
    pub fn backend_equals(backend_id: impl Into<String>) -> Self {
        Self::BackendEquals {
            backend_id: backend_id.into(),
        }
    }

    /// Creates a case-insensitive message match.
    pub fn message_contains(substring: impl Into<String>) -> Self {
        Self::MessageContains {
            substring: substring.into(),
        }
    }

    /// Negates a condition.
    pub fn negate(condition: Condition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    /// Evaluates this condition.
    pub fn matches(&self, error: &ClassifiedError, history: &ExecutionHistory) -> bool {
        match self {
            Self::CategoryIs { category } => error.category == *category,

            Self::CategoryIn { categories } => categories.contains(&error.category),

            Self::RetryableIs { retryable } => error.retryable == *retryable,

            Self::AttemptAtLeast { attempt } => error.attempt >= *attempt,

            Self::MessageContains { substring } => error
                .message
                .to_lowercase()
                .contains(&substring.to_lowercase()),

            Self::BackendEquals { backend_id } => error.backend_id.as_ref() == Some(backend_id),

            Self::DetailEquals { key, value } => error.details.get(key) == Some(value),

            Self::ErrorCountAtLeast { count } => history.error_count() >= *count,

            Self::SuggestedActionIs { action } => error.suggested_action == Some(*action),

            Self::Always => true,

            Self::Never => false,

            Self::And { conditions } => conditions.iter().all(|c| c.matches(error, history)),

            Self::Or { conditions } => conditions.iter().any(|c| c.matches(error, history)),

            Self::Not { condition } => !condition.matches(error, history),
        }
    }
}
