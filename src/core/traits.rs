//! Core traits for the routeguard library.
//!
//! This module defines the `Transport` trait that every backend call shape
//! (HTTP, gRPC, in-process function) implements. The dispatcher only ever
//! sees this one narrow interface.

use crate::core::error::BackendFailure;
use crate::core::types::DispatchRequest;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// The call interface a backend exposes to the dispatcher.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync` for use across tasks.
/// - `timeout` is the deadline the dispatcher will enforce. Transports that
///   can cancel server-side work should forward it; the dispatcher drops the
///   future when the deadline passes either way.
/// - Implementations should never panic; every failure is a `BackendFailure`.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use routeguard::core::{Transport, DispatchRequest, BackendFailure};
/// use async_trait::async_trait;
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// struct EchoTransport;
///
/// #[async_trait]
/// impl Transport for EchoTransport {
///     async fn call(
///         &self,
///         request: &DispatchRequest,
///         _timeout: Duration,
///     ) -> Result<serde_json::Value, BackendFailure> {
///         Ok(request.payload.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Executes the request against the backend.
    ///
    /// # Errors
    ///
    /// Returns a `BackendFailure` describing what went wrong; the dispatcher
    /// classifies it before deciding whether to retry or fall through.
    async fn call(
        &self,
        request: &DispatchRequest,
        timeout: Duration,
    ) -> Result<serde_json::Value, BackendFailure>;
}

/// An arc-wrapped transport for shared ownership.
pub type ArcTransport = Arc<dyn Transport>;

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn call(
        &self,
        request: &DispatchRequest,
        timeout: Duration,
    ) -> Result<serde_json::Value, BackendFailure> {
        (**self).call(request, timeout).await
    }
}
