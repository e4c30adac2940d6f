//! Backend registration and heartbeat health tracking.

mod backend;
mod health;
#[allow(clippy::module_inception)]
mod registry;

pub use backend::Backend;
pub use health::{HealthRecord, HealthStatus, DEFAULT_HEALTH_WINDOW};
pub use registry::BackendRegistry;
