//! Recorder trait definition.
//!
//! The recorder is the persistence boundary the executor writes execution
//! state through: the context after every step, each settled step result,
//! and the final run status. The host implements it against whatever store
//! it uses. Implementations should be fast or hand off asynchronously; the
//! executor awaits each hook before advancing to the next step.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use stepflow_types::error::HostError;
use stepflow_types::workflow::{RunStatus, StepResult};
use uuid::Uuid;

use crate::workflow::context::ExecutionContext;

/// Persistence hooks for workflow execution state.
pub trait Recorder: Send + Sync {
    /// Called after every context mutation (i.e. after each step settles and
    /// its result is recorded). Receives the full accumulated context.
    fn on_context_update(
        &self,
        run_id: Uuid,
        context: &ExecutionContext,
    ) -> impl std::future::Future<Output = Result<(), HostError>> + Send;

    /// Called once per step, when its result settles.
    fn on_step_settled(
        &self,
        run_id: Uuid,
        step_id: &str,
        result: &StepResult,
    ) -> impl std::future::Future<Output = Result<(), HostError>> + Send;

    /// Called exactly once per run, with the terminal status.
    fn on_run_settled(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), HostError>> + Send;
}
