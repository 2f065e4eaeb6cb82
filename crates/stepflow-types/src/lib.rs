//! Shared domain types for Stepflow.
//!
//! This crate contains the core domain types used across the Stepflow engine:
//! workflows, steps, step results, scheduler tasks, and host-interface errors.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod error;
pub mod task;
pub mod workflow;
