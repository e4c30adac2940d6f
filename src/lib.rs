//! # Routeguard
//!
//! Resilient dispatch of work across interchangeable backends, with circuit
//! breakers, bounded retries, failover and recovery escalation.
//!
//! ## Overview
//!
//! Routeguard sits between callers and a fleet of backends that serve the
//! same capabilities, allowing you to:
//!
//! - Register backends and track their health through heartbeats
//! - Select candidates by capability, priority, health and breaker state
//! - Dispatch with per-call deadlines, retries and failover
//! - Classify failures into a fixed taxonomy
//! - Decide how to recover: retry, auto-fix, human review, fallback or abort
//! - Gate executable units through a load/execute/unload lifecycle
//! - Emit structured audit events for every dispatch and decision
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use routeguard::prelude::*;
//! use routeguard::backends::MockTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(BackendRegistry::new());
//!     registry.register(Backend::new("search-a").with_capability("search").with_priority(10));
//!     registry.heartbeat("search-a")?;
//!
//!     let breaker = Arc::new(CircuitBreaker::with_defaults());
//!     let dispatcher = ResilientDispatcher::builder()
//!         .add_transport("search-a", MockTransport::new())
//!         .with_breaker(breaker.clone())
//!         .build()?;
//!
//!     let gateway = Gateway::new(CandidateSelector::new(registry, breaker), Arc::new(dispatcher));
//!
//!     let request = DispatchRequest::new("search", serde_json::json!({"q": "rust"}))
//!         .with_tenant_id("acme");
//!     let mut history = ExecutionHistory::new();
//!     let response = gateway.execute(&request, &mut history).await?;
//!
//!     println!("served by {} after {} attempt(s)", response.backend_id, response.attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Core**: requests, responses, raw backend failures and the transport trait
//! - **Config**: layered settings (global, backend, tenant, request)
//! - **Registry**: backend descriptors and heartbeat health
//! - **Circuit Breaker**: per-backend failure counting and cool-down
//! - **Selector**: ordered candidate lists
//! - **Dispatch**: the retry/failover loop and the end-to-end gateway
//! - **Classify**: the error taxonomy
//! - **Recovery**: rules, policy and the recovery orchestrator
//! - **Lifecycle**: admission state machine for executable units
//! - **Audit** and **Metrics**: structured events and counters
//! - **Ops**: operator snapshots for the `routeguard` binary

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod lifecycle;
pub mod metrics;
pub mod ops;
pub mod recovery;
pub mod registry;
pub mod selector;

// Re-export commonly used types at the crate root
pub use crate::core::{
    BackendFailure, CandidateAttempt, DispatchError, DispatchRequest, DispatchResponse,
    DispatchResult, RequestContext, RequestOverrides, Transport,
};

pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use crate::classify::{ClassifiedError, ErrorCategory, ErrorClassifier};
pub use crate::config::{ConfigSource, EffectiveSettings, LayeredConfig};
pub use crate::dispatch::{DispatchAbort, Gateway, GatewayError, ResilientDispatcher};
pub use crate::lifecycle::{LifecycleStage, LifecycleStateMachine};
pub use crate::recovery::{RecoveryAction, RecoveryDecision, RecoveryOrchestrator, RecoveryPolicy};
pub use crate::registry::{Backend, BackendRegistry};
pub use crate::selector::CandidateSelector;

/// Prelude module for convenient imports.
///
/// ```rust
/// use routeguard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        BackendFailure, DispatchError, DispatchRequest, DispatchResponse, DispatchResult,
        RequestContext, Transport,
    };
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    pub use crate::classify::{ClassifiedError, ErrorCategory};
    pub use crate::config::{ConfigSource, LayeredConfig};
    pub use crate::dispatch::{DispatchAbort, Gateway, GatewayError, ResilientDispatcher};
    pub use crate::lifecycle::LifecycleStateMachine;
    pub use crate::recovery::{ExecutionHistory, RecoveryAction, RecoveryPolicy, SelfHealer};
    pub use crate::registry::{Backend, BackendRegistry};
    pub use crate::selector::CandidateSelector;
}
