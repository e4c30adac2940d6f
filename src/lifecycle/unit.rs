//! Executable units and their load/cleanup hooks.

use crate::lifecycle::stage::LifecycleStage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;
use tokio::time::Instant;

/// What an executable unit declares about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    /// Kind of component (node type, tool name).
    pub kind: String,

    /// Declared input ports.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Declared output ports.
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Configuration schema, if the unit declares one.
    #[serde(default)]
    pub config_schema: Option<serde_json::Value>,
}

impl UnitDescriptor {
    /// Creates a descriptor for a kind of unit.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Adds an input port.
    pub fn with_input(mut self, port: impl Into<String>) -> Self {
        self.inputs.push(port.into());
        self
    }

    /// Adds an output port.
    pub fn with_output(mut self, port: impl Into<String>) -> Self {
        self.outputs.push(port.into());
        self
    }

    /// Sets the configuration schema.
    pub fn with_config_schema(mut self, schema: serde_json::Value) -> Self {
        self.config_schema = Some(schema);
        self
    }
}

/// A loaded instance of backend-side logic.
#[derive(Debug, Clone)]
pub struct ExecutableUnit {
    /// Unit id.
    pub id: String,
    /// Declared shape.
    pub descriptor: UnitDescriptor,
    /// Current stage.
    pub stage: LifecycleStage,
    /// Times the unit entered EXECUTING.
    pub executions: u64,
    /// Executions currently running on the unit.
    pub in_flight: u32,
    /// Failures recorded against the unit.
    pub failures: u64,
    /// Last failure message.
    pub last_error: Option<String>,
    /// When the unit was created.
    pub created_at: DateTime<Utc>,
    /// Last stage change.
    pub last_transition: Instant,
}

impl ExecutableUnit {
    /// Creates a unit in CREATED.
    pub fn new(id: impl Into<String>, descriptor: UnitDescriptor) -> Self {
        Self {
            id: id.into(),
            descriptor,
            stage: LifecycleStage::Created,
            executions: 0,
            in_flight: 0,
            failures: 0,
            last_error: None,
            created_at: Utc::now(),
            last_transition: Instant::now(),
        }
    }

    /// Returns a serializable view of the unit.
    pub fn status(&self) -> UnitStatus {
        UnitStatus {
            id: self.id.clone(),
            kind: self.descriptor.kind.clone(),
            stage: self.stage,
            executions: self.executions,
            in_flight: self.in_flight,
            failures: self.failures,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            in_stage_ms: self.last_transition.elapsed().as_millis() as u64,
        }
    }
}

/// Serializable view of an [`ExecutableUnit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    /// Unit id.
    pub id: String,
    /// Kind from the descriptor.
    pub kind: String,
    /// Current stage.
    pub stage: LifecycleStage,
    /// Times the unit entered EXECUTING.
    pub executions: u64,
    /// Executions currently running.
    #[serde(default)]
    pub in_flight: u32,
    /// Failures recorded.
    pub failures: u64,
    /// Last failure message.
    pub last_error: Option<String>,
    /// When the unit was created.
    pub created_at: DateTime<Utc>,
    /// Milliseconds spent in the current stage.
    pub in_stage_ms: u64,
}

/// A load or cleanup hook failed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HookError {
    /// What went wrong.
    pub message: String,
}

impl HookError {
    /// Creates a new hook error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Callbacks run when a unit is loaded and unloaded.
#[async_trait]
pub trait UnitHooks: Send + Sync + Debug {
    /// Acquires whatever the unit needs to execute.
    async fn load(&self, unit: &ExecutableUnit) -> Result<(), HookError>;

    /// Releases the unit's resources.
    async fn cleanup(&self, unit: &ExecutableUnit) -> Result<(), HookError>;
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl UnitHooks for NoopHooks {
    async fn load(&self, _unit: &ExecutableUnit) -> Result<(), HookError> {
        Ok(())
    }

    async fn cleanup(&self, _unit: &ExecutableUnit) -> Result<(), HookError> {
        Ok(())
    }
}
