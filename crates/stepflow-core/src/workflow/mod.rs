//! Workflow execution engine: condition evaluation, parameter resolution,
//! execution context, step dispatch, and the chain executor.
//!
//! - `condition` -- JEXL evaluator for condition steps
//! - `params` -- `{{path}}` placeholder resolution over config trees
//! - `context` -- per-run mutable state threaded through a workflow run
//! - `step_runner` -- per-kind step dispatch and error containment
//! - `executor` -- branch-following walk of the step graph

pub mod condition;
pub mod context;
pub mod executor;
pub mod params;
pub mod step_runner;
