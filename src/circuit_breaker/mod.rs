//! Per-backend circuit breaking.
//!
//! The circuit breaker pattern prevents cascading failures by temporarily
//! excluding failing backends from candidate lists and letting traffic back
//! through once a cool-down window has elapsed.
//!
//! ## States
//!
//! - **Closed**: Normal operation; requests pass through.
//! - **Open**: Backend is failing; it is dropped from candidate lists.
//! - **Half-Open**: Cool-down elapsed; requests pass, and one failure re-opens.
//!
//! ## Usage
//!
//! ```rust
//! use routeguard::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::default()
//!     .with_failure_threshold(5)
//!     .with_cool_down(Duration::from_secs(30));
//!
//! let breaker = CircuitBreaker::new(config);
//! assert!(breaker.allow_request("search-primary"));
//! ```

mod breaker;
mod config;
mod state;

pub use breaker::CircuitBreaker;
pub use config::{CircuitBreakerConfig, FailurePolicy};
pub use state::{BreakerMetrics, BreakerSnapshot, BreakerStatus, CircuitState};
