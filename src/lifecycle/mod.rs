//! Admission lifecycle of executable units.

mod machine;
mod stage;
mod unit;

pub use machine::LifecycleStateMachine;
pub use stage::LifecycleStage;
pub use unit::{ExecutableUnit, HookError, NoopHooks, UnitDescriptor, UnitHooks, UnitStatus};
