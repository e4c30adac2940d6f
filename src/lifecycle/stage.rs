//! Lifecycle stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Admission stage of an executable unit.
///
/// ```text
/// CREATED -> LOADING -> LOADED -> EXECUTING <-> IDLE -> UNLOADING -> UNLOADED
///               |
///               +-> FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStage {
    /// Known but not loaded.
    Created,
    /// Load hook running.
    Loading,
    /// Loaded, never executed.
    Loaded,
    /// Serving a request.
    Executing,
    /// Loaded and waiting for work.
    Idle,
    /// Cleanup hook running.
    Unloading,
    /// Gone. Terminal.
    Unloaded,
    /// Loading failed. Terminal.
    Failed,
}

impl LifecycleStage {
    /// Returns the name of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Loading => "LOADING",
            Self::Loaded => "LOADED",
            Self::Executing => "EXECUTING",
            Self::Idle => "IDLE",
            Self::Unloading => "UNLOADING",
            Self::Unloaded => "UNLOADED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns true if no transition leaves this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unloaded | Self::Failed)
    }

    /// Returns true if the unit holds loaded resources in this stage.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded | Self::Executing | Self::Idle)
    }

    /// Returns true if the unit may start executing from this stage.
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::Loaded | Self::Idle)
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_predicates() {
        assert!(LifecycleStage::Unloaded.is_terminal());
        assert!(LifecycleStage::Failed.is_terminal());
        assert!(!LifecycleStage::Idle.is_terminal());

        assert!(LifecycleStage::Idle.accepts_work());
        assert!(LifecycleStage::Loaded.accepts_work());
        assert!(!LifecycleStage::Created.accepts_work());
        assert!(!LifecycleStage::Executing.accepts_work());

        assert!(LifecycleStage::Executing.is_loaded());
        assert!(!LifecycleStage::Loading.is_loaded());
    }

    #[test]
    fn test_display() {
        assert_eq!(LifecycleStage::Created.to_string(), "CREATED");
        assert_eq!(
            serde_json::to_string(&LifecycleStage::Unloading).unwrap(),
            "\"UNLOADING\""
        );
    }
}
