//! Dispatching requests to backends.
//!
//! [`ResilientDispatcher`] runs one pass over an ordered candidate list with
//! deadlines, retries and failover. [`Gateway`] wraps it with candidate
//! selection, recovery decisions and unit lifecycle.

mod dispatcher;
mod gateway;
mod retry;

pub use dispatcher::{AbortReason, DispatchAbort, ResilientDispatcher, ResilientDispatcherBuilder};
pub use gateway::{Gateway, GatewayError, DEFAULT_GATEWAY_ATTEMPTS, DEFAULT_MAX_ROUNDS};
pub use retry::BackoffPolicy;
