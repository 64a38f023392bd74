//! Execution engine for pinestate
//!
//! The engine orchestrates:
//! 1. Planning - Decide create/update/replace/delete per instance
//! 2. Diffing - Render field-level drift
//! 3. Executing - Apply changes tier by tier with parallelism

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ExecuteOptions, ExecuteSummary, StepResult, execute, refresh, run_plan};
pub use planner::{Action, ExecutionPlan, Target};
