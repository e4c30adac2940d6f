//! Heartbeat-based health records.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Default window within which a heartbeat keeps a backend healthy.
pub const DEFAULT_HEALTH_WINDOW: Duration = Duration::from_secs(30);

/// Last heartbeat seen from a backend.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    /// Backend the record belongs to.
    pub backend_id: String,

    /// When the last heartbeat arrived.
    pub last_heartbeat: Instant,
}

impl HealthRecord {
    /// Creates a record with a heartbeat at `now`.
    pub fn new(backend_id: impl Into<String>, now: Instant) -> Self {
        Self {
            backend_id: backend_id.into(),
            last_heartbeat: now,
        }
    }

    /// Returns `true` iff `now - last_heartbeat < window`.
    pub fn is_healthy(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat) < window
    }

    /// Time since the last heartbeat.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heartbeat)
    }
}

/// Serializable view of a backend's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Backend id.
    pub backend_id: String,

    /// Whether the backend is inside its health window.
    pub healthy: bool,

    /// Milliseconds since the last heartbeat, or `None` if none was ever seen.
    pub last_heartbeat_age_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_window_is_exclusive() {
        let now = Instant::now();
        let record = HealthRecord::new("a", now);
        let window = Duration::from_secs(30);

        assert!(record.is_healthy(now, window));
        assert!(record.is_healthy(now + Duration::from_millis(29_999), window));
        assert!(!record.is_healthy(now + window, window));
        assert_eq!(record.age(now + Duration::from_secs(5)), Duration::from_secs(5));
    }
}
