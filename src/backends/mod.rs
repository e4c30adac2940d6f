//! Transport implementations.
//!
//! Concrete network transports (HTTP, gRPC) live with their callers and
//! implement [`Transport`](crate::core::Transport). This module ships the
//! scriptable [`MockTransport`] used in tests and demos.

mod mock;

pub use mock::{MockOutcome, MockTransport};
