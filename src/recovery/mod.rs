//! Recovery decisions for classified errors.
//!
//! The [`RecoveryOrchestrator`] chooses between retrying, auto-fixing,
//! escalating to a human, falling back, and aborting. Custom behavior is
//! expressed as declarative [`RecoveryRule`]s built from a closed set of
//! [`Condition`]s, so policies can be loaded from configuration without an
//! embedded expression language.

mod action;
mod healing;
mod history;
mod orchestrator;
mod policy;
mod rules;

pub use action::{RecoveryAction, RecoveryDecision};
pub use healing::{HealingFailure, NoopHealer, SelfHealer};
pub use history::{DecisionRecord, ExecutionHistory};
pub use orchestrator::RecoveryOrchestrator;
pub use policy::{FallbackTarget, RecoveryPolicy};
pub use rules::{Condition, RecoveryRule};
