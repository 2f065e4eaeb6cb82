//! Stepflow engine core: workflow execution and task scheduling.
//!
//! This crate is the "brain" of Stepflow:
//! - `workflow` -- condition evaluation, parameter resolution, execution
//!   context, step dispatch, and the branch-following chain executor
//! - `scheduler` -- polling task queue with priority ordering, bounded
//!   concurrency, retry-with-backoff, and graceful shutdown
//! - `recorder` -- the persistence boundary the executor writes through
//! - `event` -- broadcast bus for run/step/task lifecycle events
//!
//! Persistence, transport, and capability invocation are behind host traits
//! (`Recorder`, `CapabilityInvoker`, `TaskSource`, `TaskSink`, `TaskRunner`);
//! this crate never constructs transport-shaped values or touches a database.

pub mod event;
pub mod recorder;
pub mod scheduler;
pub mod workflow;
