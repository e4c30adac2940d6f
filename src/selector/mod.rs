//! Candidate selection.
//!
//! Turns a request into the ordered list of backends the dispatcher will try.

use crate::circuit_breaker::CircuitBreaker;
use crate::core::DispatchRequest;
use crate::registry::{Backend, BackendRegistry};

use std::cmp::Reverse;
use std::sync::Arc;

/// Produces ordered candidate lists from the registry and breaker state.
///
/// A backend is a candidate when it is enabled, declares the requested
/// capability, is among the pinned backends (if the request pins any), has a
/// breaker that admits traffic, and is healthy. Candidates are sorted by
/// descending priority; ties keep registration order.
#[derive(Debug, Clone)]
pub struct CandidateSelector {
    registry: Arc<BackendRegistry>,
    breaker: Arc<CircuitBreaker>,
    require_healthy: bool,
}

impl CandidateSelector {
    /// Creates a selector over the given registry and breakers.
    pub fn new(registry: Arc<BackendRegistry>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            registry,
            breaker,
            require_healthy: true,
        }
    }

    /// Enables or disables the heartbeat health filter.
    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.require_healthy = enabled;
        self
    }

    /// Returns the registry this selector reads from.
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Returns the breakers this selector consults.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Selects the ordered candidates for a request. May be empty.
    pub fn select(&self, request: &DispatchRequest) -> Vec<Arc<Backend>> {
        let mut candidates: Vec<Arc<Backend>> = self
            .registry
            .list(&request.capability)
            .into_iter()
            .filter(|backend| {
                request.pinned_backends.is_empty() || request.pinned_backends.contains(&backend.id)
            })
            .filter(|backend| {
                let allowed = self.breaker.allow_request(&backend.id);
                if !allowed {
                    tracing::debug!(backend = %backend.id, "Excluded: circuit open");
                }
                allowed
            })
            .filter(|backend| {
                let healthy = !self.require_healthy || self.registry.is_healthy(&backend.id);
                if !healthy {
                    tracing::debug!(backend = %backend.id, "Excluded: no recent heartbeat");
                }
                healthy
            })
            .collect();

        candidates.sort_by_key(|backend| Reverse(backend.priority));

        tracing::debug!(
            request_id = %request.id,
            capability = %request.capability,
            candidates = ?candidates.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            "Selected candidates"
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn setup() -> (Arc<BackendRegistry>, Arc<CircuitBreaker>, CandidateSelector) {
        let registry = Arc::new(BackendRegistry::new());
        let breaker = Arc::new(CircuitBreaker::with_defaults());
        let selector = CandidateSelector::new(Arc::clone(&registry), Arc::clone(&breaker));
        (registry, breaker, selector)
    }

    fn add(registry: &BackendRegistry, id: &str, priority: i32) {
        registry.register(Backend::new(id).with_capability("search").with_priority(priority));
        registry.heartbeat(id).unwrap();
    }

    fn ids(candidates: &[Arc<Backend>]) -> Vec<&str> {
        candidates.iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn test_sorted_by_priority_with_stable_ties() {
        let (registry, _, selector) = setup();
        add(&registry, "low", 1);
        add(&registry, "tie-first", 5);
        add(&registry, "high", 10);
        add(&registry, "tie-second", 5);

        let request = DispatchRequest::new("search", serde_json::Value::Null);
        assert_eq!(
            ids(&selector.select(&request)),
            vec!["high", "tie-first", "tie-second", "low"]
        );
    }

    #[test]
    fn test_excludes_open_disabled_and_incapable() {
        let (registry, breaker, selector) = setup();
        add(&registry, "a", 10);
        add(&registry, "b", 5);
        registry.register(Backend::new("c").with_capability("search").with_enabled(false));
        registry.heartbeat("c").unwrap();
        registry.register(Backend::new("d").with_capability("exec").with_priority(100));
        registry.heartbeat("d").unwrap();

        breaker.force_open("a", Duration::from_secs(30));

        let request = DispatchRequest::new("search", serde_json::Value::Null);
        assert_eq!(ids(&selector.select(&request)), vec!["b"]);
    }

    #[test]
    fn test_excludes_unhealthy_unless_disabled() {
        let (registry, _, selector) = setup();
        add(&registry, "a", 1);
        registry.register(Backend::new("silent").with_capability("search").with_priority(9));

        let request = DispatchRequest::new("search", serde_json::Value::Null);
        assert_eq!(ids(&selector.select(&request)), vec!["a"]);

        let lenient = selector.clone().with_health_check(false);
        assert_eq!(ids(&lenient.select(&request)), vec!["silent", "a"]);
    }

    #[test]
    fn test_pinned_backends_intersect() {
        let (registry, _, selector) = setup();
        add(&registry, "a", 1);
        add(&registry, "b", 2);
        add(&registry, "c", 3);

        let request = DispatchRequest::new("search", serde_json::Value::Null)
            .pin_backend("a")
            .pin_backend("c")
            .pin_backend("not-registered");
        assert_eq!(ids(&selector.select(&request)), vec!["c", "a"]);
    }

    #[test]
    fn test_empty_when_nothing_matches() {
        let (_, _, selector) = setup();
        let request = DispatchRequest::new("search", serde_json::Value::Null);
        assert!(selector.select(&request).is_empty());
    }
}
