//! The lifecycle state machine.

use crate::audit;
use crate::core::{DispatchError, DispatchResult};
use crate::lifecycle::stage::LifecycleStage;
use crate::lifecycle::unit::{ExecutableUnit, NoopHooks, UnitDescriptor, UnitHooks, UnitStatus};

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

type UnitCell = Arc<Mutex<ExecutableUnit>>;

/// Governs when executable units may accept work.
///
/// Each unit sits behind its own async mutex, held for the whole of a
/// transition including the load and cleanup hooks. Transitions on one unit
/// are therefore serialized while different units proceed independently.
#[derive(Debug)]
pub struct LifecycleStateMachine {
    units: DashMap<String, UnitCell>,
    hooks: Arc<dyn UnitHooks>,
}

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleStateMachine {
    /// Creates a machine with no-op hooks.
    pub fn new() -> Self {
        Self::with_hooks(Arc::new(NoopHooks))
    }

    /// Creates a machine with the given hooks.
    pub fn with_hooks(hooks: Arc<dyn UnitHooks>) -> Self {
        Self {
            units: DashMap::new(),
            hooks,
        }
    }

    /// Tracks a new unit in CREATED. Returns `false` if the id is taken.
    pub fn create(&self, id: impl Into<String>, descriptor: UnitDescriptor) -> bool {
        let id = id.into();
        let mut created = false;
        self.units.entry(id.clone()).or_insert_with(|| {
            created = true;
            Arc::new(Mutex::new(ExecutableUnit::new(id.clone(), descriptor)))
        });
        if created {
            tracing::debug!(unit = %id, "Unit created");
        }
        created
    }

    /// Loads a unit: CREATED -> LOADING -> LOADED, or FAILED if the load hook
    /// fails.
    pub async fn initialize(&self, id: &str) -> DispatchResult<()> {
        let cell = self.cell(id)?;
        let mut unit = cell.lock().await;

        if unit.stage != LifecycleStage::Created {
            return Err(invalid(&unit, "initialize"));
        }
        self.load_locked(&mut unit).await
    }

    /// LOADED | IDLE -> EXECUTING.
    pub async fn mark_executing(&self, id: &str) -> DispatchResult<()> {
        let cell = self.cell(id)?;
        let mut unit = cell.lock().await;
        begin_locked(&mut unit, false)
    }

    /// EXECUTING -> IDLE once the last running execution finishes.
    pub async fn mark_idle(&self, id: &str) -> DispatchResult<()> {
        let cell = self.cell(id)?;
        let mut unit = cell.lock().await;

        if unit.stage != LifecycleStage::Executing {
            return Err(invalid(&unit, "mark_idle"));
        }
        unit.in_flight = unit.in_flight.saturating_sub(1);
        if unit.in_flight == 0 {
            transition(&mut unit, LifecycleStage::Idle);
        }
        Ok(())
    }

    /// Readies a unit for one execution and marks it EXECUTING.
    ///
    /// The unit is created and loaded on first use. A unit that was unloaded
    /// or evicted is replaced by a fresh one. A unit already EXECUTING takes
    /// the execution alongside the running ones. FAILED units stay refused.
    pub async fn admit(&self, id: &str, descriptor: UnitDescriptor) -> DispatchResult<()> {
        self.create(id, descriptor.clone());
        let cell = self.cell(id)?;
        let mut unit = cell.lock().await;

        if unit.stage == LifecycleStage::Unloaded {
            *unit = ExecutableUnit::new(id, descriptor);
            tracing::debug!(unit = %id, "Unloaded unit recreated");
        }
        if unit.stage == LifecycleStage::Created {
            self.load_locked(&mut unit).await?;
        }
        begin_locked(&mut unit, true)
    }

    /// Records a failure against the unit without changing its stage.
    pub async fn record_failure(&self, id: &str, message: impl Into<String>) -> DispatchResult<()> {
        let cell = self.cell(id)?;
        let mut unit = cell.lock().await;
        unit.failures += 1;
        unit.last_error = Some(message.into());
        Ok(())
    }

    /// Unloads a unit. An accepted unload always ends in UNLOADED.
    ///
    /// The cleanup hook runs only if the unit was loaded. Cleanup failures
    /// are logged and recorded as the unit's last error, never returned.
    /// Refused from UNLOADED and FAILED.
    pub async fn unload(&self, id: &str) -> DispatchResult<()> {
        let cell = self.cell(id)?;
        let mut unit = cell.lock().await;
        self.unload_locked(&mut unit).await
    }

    /// Returns the unit's stage.
    pub async fn stage(&self, id: &str) -> Option<LifecycleStage> {
        let cell = self.cell(id).ok()?;
        let stage = cell.lock().await.stage;
        Some(stage)
    }

    /// Returns the unit's status.
    pub async fn status(&self, id: &str) -> Option<UnitStatus> {
        let cell = self.cell(id).ok()?;
        let status = cell.lock().await.status();
        Some(status)
    }

    /// Returns every unit's status, sorted by id.
    pub async fn statuses(&self) -> Vec<UnitStatus> {
        let mut statuses = Vec::new();
        for cell in self.cells() {
            statuses.push(cell.lock().await.status());
        }
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Unloads units that have been IDLE for at least `max_idle`.
    ///
    /// Returns the ids that were unloaded.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut evicted = Vec::new();

        for cell in self.cells() {
            let mut unit = cell.lock().await;
            let stale = unit.stage == LifecycleStage::Idle
                && now.saturating_duration_since(unit.last_transition) >= max_idle;
            if stale && self.unload_locked(&mut unit).await.is_ok() {
                evicted.push(unit.id.clone());
            }
        }

        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Evicted idle units");
        }
        evicted
    }

    /// Unloads every live unit concurrently. Returns how many were unloaded.
    pub async fn shutdown(&self) -> usize {
        let unloads = self.cells().into_iter().map(|cell| async move {
            let mut unit = cell.lock().await;
            if unit.stage.is_terminal() {
                return false;
            }
            self.unload_locked(&mut unit).await.is_ok()
        });

        let unloaded = join_all(unloads).await.into_iter().filter(|ok| *ok).count();
        tracing::info!(unloaded, "Lifecycle shutdown complete");
        unloaded
    }

    /// Stops tracking a unit in a terminal stage.
    pub async fn remove(&self, id: &str) -> DispatchResult<()> {
        let cell = self.cell(id)?;
        let unit = cell.lock().await;
        if !unit.stage.is_terminal() {
            return Err(invalid(&unit, "remove"));
        }
        drop(unit);
        self.units.remove(id);
        Ok(())
    }

    /// Returns `true` if the unit is tracked.
    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    /// Returns the number of tracked units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if no units are tracked.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    async fn load_locked(&self, unit: &mut ExecutableUnit) -> DispatchResult<()> {
        transition(unit, LifecycleStage::Loading);
        match self.hooks.load(unit).await {
            Ok(()) => {
                transition(unit, LifecycleStage::Loaded);
                Ok(())
            }
            Err(e) => {
                unit.failures += 1;
                unit.last_error = Some(e.message.clone());
                transition(unit, LifecycleStage::Failed);
                tracing::warn!(unit = %unit.id, error = %e, "Unit failed to load");
                Err(DispatchError::InitializationFailed {
                    unit: unit.id.clone(),
                    reason: e.message,
                })
            }
        }
    }

    async fn unload_locked(&self, unit: &mut ExecutableUnit) -> DispatchResult<()> {
        if unit.stage.is_terminal() {
            return Err(invalid(unit, "unload"));
        }

        let was_loaded = unit.stage.is_loaded();
        unit.in_flight = 0;
        transition(unit, LifecycleStage::Unloading);

        if was_loaded {
            if let Err(e) = self.hooks.cleanup(unit).await {
                tracing::warn!(unit = %unit.id, error = %e, "Cleanup failed; unloading anyway");
                unit.failures += 1;
                unit.last_error = Some(e.message);
            }
        }

        transition(unit, LifecycleStage::Unloaded);
        Ok(())
    }

    fn cell(&self, id: &str) -> DispatchResult<UnitCell> {
        self.units
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DispatchError::UnknownUnit { id: id.to_string() })
    }

    // Cloned out so no map shard lock is held across an await.
    fn cells(&self) -> Vec<UnitCell> {
        self.units.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}

fn begin_locked(unit: &mut ExecutableUnit, join_running: bool) -> DispatchResult<()> {
    if join_running && unit.stage == LifecycleStage::Executing {
        unit.in_flight += 1;
    } else if unit.stage.accepts_work() {
        unit.in_flight = 1;
        transition(unit, LifecycleStage::Executing);
    } else {
        return Err(invalid(unit, "mark_executing"));
    }
    unit.executions += 1;
    Ok(())
}

fn transition(unit: &mut ExecutableUnit, to: LifecycleStage) {
    let from = unit.stage;
    unit.stage = to;
    unit.last_transition = Instant::now();
    tracing::debug!(unit = %unit.id, %from, %to, "Lifecycle transition");
    audit::emit_lifecycle_transition(&unit.id, from, to);
}

fn invalid(unit: &ExecutableUnit, operation: &'static str) -> DispatchError {
    DispatchError::InvalidTransition {
        unit: unit.id.clone(),
        from: unit.stage,
        operation,
    }
}
