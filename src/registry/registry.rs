//! The backend registry.

use crate::core::{DispatchError, DispatchResult};
use crate::registry::backend::Backend;
use crate::registry::health::{HealthRecord, HealthStatus, DEFAULT_HEALTH_WINDOW};

use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Tracks known backends, their capabilities and their heartbeats.
///
/// The backend list is copy-on-write: readers clone an `Arc` of the current
/// list and never block writers for longer than that clone. Health records
/// live in a sharded map keyed by backend id.
///
/// # Example
///
/// ```rust
/// use routeguard::registry::{Backend, BackendRegistry};
///
/// let registry = BackendRegistry::new();
/// registry.register(Backend::new("search-a").with_capability("search").with_priority(10));
/// registry.heartbeat("search-a").unwrap();
///
/// assert_eq!(registry.list("search").len(), 1);
/// assert!(registry.is_healthy("search-a"));
/// ```
#[derive(Debug)]
pub struct BackendRegistry {
    backends: RwLock<Arc<Vec<Arc<Backend>>>>,
    health: DashMap<String, HealthRecord>,
    health_window: Duration,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    /// Creates an empty registry with a 30 second health window.
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(Arc::new(Vec::new())),
            health: DashMap::new(),
            health_window: DEFAULT_HEALTH_WINDOW,
        }
    }

    /// Sets the health window.
    pub fn with_health_window(mut self, window: Duration) -> Self {
        self.health_window = window;
        self
    }

    /// Returns the health window.
    pub fn health_window(&self) -> Duration {
        self.health_window
    }

    /// Registers a backend, replacing any previous entry with the same id.
    ///
    /// A replaced entry keeps its slot in registration order. Returns the
    /// previous descriptor, if any.
    pub fn register(&self, backend: Backend) -> Option<Arc<Backend>> {
        let backend = Arc::new(backend);
        let mut guard = self.backends.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next: Vec<Arc<Backend>> = guard.as_ref().clone();

        let previous = match next.iter().position(|b| b.id == backend.id) {
            Some(index) => Some(std::mem::replace(&mut next[index], Arc::clone(&backend))),
            None => {
                next.push(Arc::clone(&backend));
                None
            }
        };
        *guard = Arc::new(next);

        tracing::info!(
            backend = %backend.id,
            priority = backend.priority,
            enabled = backend.enabled,
            replaced = previous.is_some(),
            "Backend registered"
        );
        previous
    }

    /// Removes a backend and its health record.
    pub fn unregister(&self, id: &str) -> Option<Arc<Backend>> {
        let mut guard = self.backends.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let index = guard.iter().position(|b| b.id == id)?;

        let mut next: Vec<Arc<Backend>> = guard.as_ref().clone();
        let removed = next.remove(index);
        *guard = Arc::new(next);
        self.health.remove(id);
        drop(guard);

        tracing::info!(backend = id, "Backend unregistered");
        Some(removed)
    }

    /// Records a heartbeat from a registered backend.
    pub fn heartbeat(&self, id: &str) -> DispatchResult<()> {
        // Held across the insert so a concurrent unregister cannot leave an
        // orphaned health record behind.
        let guard = self.backends.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !guard.iter().any(|b| b.id == id) {
            return Err(DispatchError::UnknownBackend { id: id.to_string() });
        }

        let now = Instant::now();
        self.health
            .entry(id.to_string())
            .and_modify(|record| record.last_heartbeat = now)
            .or_insert_with(|| HealthRecord::new(id, now));
        drop(guard);

        tracing::trace!(backend = id, "Heartbeat");
        Ok(())
    }

    /// Returns enabled backends serving `capability`, in registration order.
    ///
    /// Health is not considered here; the selector filters on it.
    pub fn list(&self, capability: &str) -> Vec<Arc<Backend>> {
        self.snapshot()
            .iter()
            .filter(|b| b.enabled && b.serves(capability))
            .cloned()
            .collect()
    }

    /// Returns every registered backend, in registration order.
    pub fn all(&self) -> Vec<Arc<Backend>> {
        self.snapshot().as_ref().clone()
    }

    /// Looks up a backend by id.
    pub fn get(&self, id: &str) -> Option<Arc<Backend>> {
        self.snapshot().iter().find(|b| b.id == id).cloned()
    }

    /// Returns `true` iff the backend's last heartbeat is inside the window.
    ///
    /// A backend that never sent a heartbeat is unhealthy.
    pub fn is_healthy(&self, id: &str) -> bool {
        let now = Instant::now();
        self.health
            .get(id)
            .map(|record| record.is_healthy(now, self.health_window))
            .unwrap_or(false)
    }

    /// Returns the ids of registered backends that are not healthy.
    pub fn unhealthy(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .filter(|b| !self.is_healthy(&b.id))
            .map(|b| b.id.clone())
            .collect()
    }

    /// Returns the health status of one backend.
    pub fn health_status(&self, id: &str) -> Option<HealthStatus> {
        self.get(id)?;
        let now = Instant::now();
        let record = self.health.get(id);
        Some(HealthStatus {
            backend_id: id.to_string(),
            healthy: record
                .as_ref()
                .map(|r| r.is_healthy(now, self.health_window))
                .unwrap_or(false),
            last_heartbeat_age_ms: record.map(|r| r.age(now).as_millis() as u64),
        })
    }

    /// Returns the health status of every backend, in registration order.
    pub fn health_statuses(&self) -> Vec<HealthStatus> {
        self.snapshot()
            .iter()
            .filter_map(|b| self.health_status(&b.id))
            .collect()
    }

    /// Returns the number of registered backends.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns `true` if no backends are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Vec<Arc<Backend>>> {
        let guard = self.backends.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }
}
