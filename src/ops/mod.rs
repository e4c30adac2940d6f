//! Operator view of a running fleet.
//!
//! A [`FleetSnapshot`] is a JSON export of the registry, health and breaker
//! state of a process. Operators inspect and edit it with the `routeguard`
//! binary; it is a diagnostic artifact and is never read back on startup.

use crate::circuit_breaker::{BreakerMetrics, BreakerSnapshot, BreakerStatus, CircuitBreaker};
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::registry::{Backend, BackendRegistry, HealthStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from snapshot operations.
#[derive(Debug, Error)]
pub enum OpsError {
    /// The snapshot knows nothing about this backend.
    #[error("unknown backend: {id}")]
    UnknownBackend {
        /// The id that was looked up.
        id: String,
    },

    /// Reading or writing the snapshot file failed.
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        /// The snapshot file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file is not valid JSON.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// The snapshot file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Serializable state of a fleet at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,

    /// Registered backends, in registration order.
    pub backends: Vec<Backend>,

    /// Health of every registered backend.
    pub health: Vec<HealthStatus>,

    /// Breaker state, sorted by backend id.
    pub breakers: Vec<BreakerSnapshot>,

    /// Dispatch counters, if captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
}

impl FleetSnapshot {
    /// Captures the state of a live registry and breaker set.
    ///
    /// Every registered backend gets a breaker entry, closed if its breaker
    /// was never touched.
    pub fn capture(registry: &BackendRegistry, breaker: &CircuitBreaker) -> Self {
        let backends: Vec<Backend> = registry.all().iter().map(|b| (**b).clone()).collect();

        let mut breakers = breaker.snapshots();
        for backend in &backends {
            if !breakers.iter().any(|s| s.backend_id == backend.id) {
                breakers.push(closed(&backend.id));
            }
        }
        breakers.sort_by(|a, b| a.backend_id.cmp(&b.backend_id));

        Self {
            captured_at: Utc::now(),
            backends,
            health: registry.health_statuses(),
            breakers,
            metrics: None,
        }
    }

    /// Adds the dispatch counters.
    pub fn with_metrics(mut self, metrics: &DispatchMetrics) -> Self {
        self.metrics = Some(metrics.snapshot());
        self
    }

    /// Reads a snapshot from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, OpsError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|source| OpsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| OpsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the snapshot as pretty-printed JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), OpsError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).map_err(|source| OpsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| OpsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "Snapshot written");
        Ok(())
    }

    /// Returns the breaker state of one backend.
    pub fn breaker(&self, id: &str) -> Result<&BreakerSnapshot, OpsError> {
        self.breakers
            .iter()
            .find(|s| s.backend_id == id)
            .ok_or_else(|| OpsError::UnknownBackend { id: id.to_string() })
    }

    /// Marks a backend's breaker open for `cool_down`.
    pub fn force_open(&mut self, id: &str, cool_down: Duration) -> Result<&BreakerSnapshot, OpsError> {
        let cool_down_ms = u64::try_from(cool_down.as_millis()).unwrap_or(u64::MAX);
        let snapshot = self.breaker_mut(id)?;
        snapshot.status = BreakerStatus::Open;
        snapshot.consecutive_failures = 0;
        snapshot.open_remaining_ms = Some(cool_down_ms);
        snapshot.metrics.times_opened += 1;
        tracing::info!(backend = id, cool_down_ms, "Breaker forced open");
        Ok(snapshot)
    }

    /// Marks a backend's breaker closed with a cleared failure count.
    pub fn force_close(&mut self, id: &str) -> Result<&BreakerSnapshot, OpsError> {
        let snapshot = self.breaker_mut(id)?;
        snapshot.status = BreakerStatus::Closed;
        snapshot.consecutive_failures = 0;
        snapshot.open_remaining_ms = None;
        tracing::info!(backend = id, "Breaker forced closed");
        Ok(snapshot)
    }

    /// Returns the ids of backends that were not healthy when captured.
    pub fn unhealthy(&self) -> Vec<&str> {
        self.backends
            .iter()
            .filter(|b| {
                !self
                    .health
                    .iter()
                    .any(|h| h.backend_id == b.id && h.healthy)
            })
            .map(|b| b.id.as_str())
            .collect()
    }

    /// Returns the health entry of one backend.
    pub fn health_of(&self, id: &str) -> Option<&HealthStatus> {
        self.health.iter().find(|h| h.backend_id == id)
    }

    fn breaker_mut(&mut self, id: &str) -> Result<&mut BreakerSnapshot, OpsError> {
        if !self.breakers.iter().any(|s| s.backend_id == id) {
            if !self.backends.iter().any(|b| b.id == id) {
                return Err(OpsError::UnknownBackend { id: id.to_string() });
            }
            self.breakers.push(closed(id));
            self.breakers.sort_by(|a, b| a.backend_id.cmp(&b.backend_id));
        }
        self.breakers
            .iter_mut()
            .find(|s| s.backend_id == id)
            .ok_or_else(|| OpsError::UnknownBackend { id: id.to_string() })
    }
}

fn closed(backend_id: &str) -> BreakerSnapshot {
    BreakerSnapshot {
        backend_id: backend_id.to_string(),
        status: BreakerStatus::Closed,
        consecutive_failures: 0,
        open_remaining_ms: None,
        metrics: BreakerMetrics::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn live() -> (BackendRegistry, CircuitBreaker) {
        let registry = BackendRegistry::new();
        registry.register(Backend::new("search-a").with_capability("search"));
        registry.register(Backend::new("search-b").with_capability("search"));
        registry.heartbeat("search-a").unwrap();

        let breaker = CircuitBreaker::with_defaults();
        breaker.force_open("search-b", Duration::from_secs(30));
        (registry, breaker)
    }

    #[tokio::test]
    async fn test_capture_covers_every_backend() {
        let (registry, breaker) = live();
        let snapshot = FleetSnapshot::capture(&registry, &breaker);

        assert_eq!(snapshot.backends.len(), 2);
        assert_eq!(snapshot.breakers.len(), 2);
        assert_eq!(snapshot.breaker("search-a").unwrap().status, BreakerStatus::Closed);
        assert_eq!(snapshot.breaker("search-b").unwrap().status, BreakerStatus::Open);
        assert_eq!(snapshot.unhealthy(), vec!["search-b"]);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleet.json");

        let (registry, breaker) = live();
        let metrics = DispatchMetrics::new();
        metrics.record_attempt();
        let snapshot = FleetSnapshot::capture(&registry, &breaker).with_metrics(&metrics);
        snapshot.save(&path).await.unwrap();

        let loaded = FleetSnapshot::load(&path).await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.metrics.unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_force_open_and_close() {
        let (registry, breaker) = live();
        let mut snapshot = FleetSnapshot::capture(&registry, &breaker);

        let opened = snapshot.force_open("search-a", Duration::from_secs(5)).unwrap();
        assert_eq!(opened.status, BreakerStatus::Open);
        assert_eq!(opened.open_remaining_ms, Some(5000));

        let forever = snapshot.force_open("search-b", Duration::MAX).unwrap();
        assert_eq!(forever.open_remaining_ms, Some(u64::MAX));

        let closed = snapshot.force_close("search-b").unwrap();
        assert_eq!(closed.status, BreakerStatus::Closed);
        assert_eq!(closed.open_remaining_ms, None);
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let (registry, breaker) = live();
        let mut snapshot = FleetSnapshot::capture(&registry, &breaker);

        assert!(matches!(snapshot.breaker("nope"), Err(OpsError::UnknownBackend { .. })));
        assert!(matches!(
            snapshot.force_open("nope", Duration::from_secs(1)),
            Err(OpsError::UnknownBackend { .. })
        ));
        assert!(matches!(snapshot.force_close("nope"), Err(OpsError::UnknownBackend { .. })));
    }

    #[tokio::test]
    async fn test_load_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        assert!(matches!(FleetSnapshot::load(&path).await, Err(OpsError::Parse { .. })));
        assert!(matches!(
            FleetSnapshot::load(dir.path().join("missing.json")).await,
            Err(OpsError::Io { .. })
        ));
    }
}
