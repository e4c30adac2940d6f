//! Recovery policy configuration.

use crate::core::{DispatchError, DispatchResult};
use crate::recovery::rules::RecoveryRule;

use serde::{Deserialize, Serialize};

/// Where FALLBACK decisions re-target a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackTarget {
    /// Capability to request instead. `None` keeps the original capability.
    #[serde(default)]
    pub capability: Option<String>,

    /// Backends to pin the fallback request to. Empty means "any".
    #[serde(default)]
    pub backends: Vec<String>,
}

impl FallbackTarget {
    /// Creates a fallback to another capability.
    pub fn capability(capability: impl Into<String>) -> Self {
        Self {
            capability: Some(capability.into()),
            backends: Vec::new(),
        }
    }

    /// Creates a fallback pinned to specific backends.
    pub fn backends(backends: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            capability: None,
            backends: backends.into_iter().map(Into::into).collect(),
        }
    }
}

/// Recovery policy consulted by the orchestrator.
///
/// Loadable from TOML:
///
/// ```toml
/// auto_fix_enabled = true
///
/// [fallback]
/// capability = "search-cached"
///
/// [[rules]]
/// id = "review-payment"
/// action = "HUMAN_REVIEW"
/// priority = 10
/// conditions = [{ type = "backend_equals", backend_id = "payments" }]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryPolicy {
    /// Custom rules, evaluated by descending priority.
    pub rules: Vec<RecoveryRule>,

    /// Whether AUTO_FIX may be chosen at all.
    pub auto_fix_enabled: bool,

    /// Whether a backend's suggested AUTO_FIX makes a category eligible that
    /// otherwise would not be. Suggestions never apply to SECURITY errors.
    pub trust_suggested_actions: bool,

    /// Escalate once an error's attempt counter reaches this value.
    pub escalation_attempt_threshold: u32,

    /// Escalate once the run has seen this many errors.
    pub escalation_error_threshold: u32,

    /// Fallback target, if any.
    pub fallback: Option<FallbackTarget>,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            auto_fix_enabled: false,
            trust_suggested_actions: true,
            escalation_attempt_threshold: 2,
            escalation_error_threshold: 5,
            fallback: None,
        }
    }
}

impl RecoveryPolicy {
    /// Creates the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a policy from TOML.
    pub fn from_toml_str(content: &str) -> DispatchResult<Self> {
        let mut policy: Self = toml::from_str(content)
            .map_err(|e| DispatchError::configuration(format!("invalid recovery policy: {e}")))?;
        policy.sort_rules();
        Ok(policy)
    }

    /// Adds a rule, keeping rules sorted by priority (highest first).
    pub fn add_rule(&mut self, rule: RecoveryRule) {
        self.rules.push(rule);
        self.sort_rules();
    }

    /// Adds a rule and returns self for chaining.
    pub fn with_rule(mut self, rule: RecoveryRule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Enables or disables auto-fix.
    pub fn with_auto_fix(mut self, enabled: bool) -> Self {
        self.auto_fix_enabled = enabled;
        self
    }

    /// Sets whether suggested actions are trusted.
    pub fn with_trust_suggested_actions(mut self, trusted: bool) -> Self {
        self.trust_suggested_actions = trusted;
        self
    }

    /// Sets the escalation thresholds.
    pub fn with_escalation(mut self, attempt_threshold: u32, error_threshold: u32) -> Self {
        self.escalation_attempt_threshold = attempt_threshold;
        self.escalation_error_threshold = error_threshold;
        self
    }

    /// Sets the fallback target.
    pub fn with_fallback(mut self, fallback: FallbackTarget) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Returns the rules in evaluation order.
    pub fn rules(&self) -> &[RecoveryRule] {
        &self.rules
    }

    fn sort_rules(&mut self) {
        // Stable: equal priorities keep insertion order.
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }
}
