//! Backend descriptors.

use crate::config::SettingsOverlay;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An interchangeable backend that can serve one or more capabilities.
///
/// Immutable once registered; re-registering the same id replaces the whole
/// descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    /// Unique identifier.
    pub id: String,

    /// Capability tags this backend can serve.
    pub capabilities: BTreeSet<String>,

    /// Higher priorities are tried first.
    pub priority: i32,

    /// Disabled backends are never listed as candidates.
    pub enabled: bool,

    /// Settings declared at registration time.
    #[serde(default)]
    pub settings: SettingsOverlay,
}

impl Backend {
    /// Creates an enabled backend with priority 0 and no capabilities.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: BTreeSet::new(),
            priority: 0,
            enabled: true,
            settings: SettingsOverlay::default(),
        }
    }

    /// Adds a capability.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the registration settings overlay.
    pub fn with_settings(mut self, settings: SettingsOverlay) -> Self {
        self.settings = settings;
        self
    }

    /// Returns `true` if the backend declares `capability`.
    pub fn serves(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}
