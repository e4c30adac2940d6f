//! Core types and traits for the routeguard library.
//!
//! - [`types`] - Requests, per-call overrides, responses
//! - [`traits`] - The `Transport` trait backends implement
//! - [`error`] - Raw backend failures and library errors

pub mod error;
pub mod traits;
pub mod types;

pub use error::{BackendFailure, DispatchError, DispatchResult};
pub use traits::{ArcTransport, Transport};
pub use types::{CandidateAttempt, DispatchRequest, DispatchResponse, RequestContext, RequestOverrides};
