//! Step runner for the four workflow step kinds.
//!
//! `StepRunner` dispatches execution to the appropriate handler based on
//! `StepKind`. Each handler resolves `{{path}}` placeholders in the step's
//! config against the execution context, executes the step logic, and
//! returns a `StepResult`. Handlers never unwind: capability failures and
//! bad configs become failed results so the executor can branch on
//! `on_failure`.
//!
//! Step kinds: Delay, Condition, ToolCall, ActionCall. Delay and Condition
//! run in-process; ToolCall and ActionCall are delegated to the host through
//! the `CapabilityInvoker` seam.

use serde_json::{Value, json};
use stepflow_types::workflow::{Step, StepKind, StepResult};

use super::condition::ConditionEvaluator;
use super::context::ExecutionContext;
use super::params;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum delay a single delay step may sleep, in milliseconds.
pub const MAX_DELAY_MS: u64 = 300_000;

// ---------------------------------------------------------------------------
// CapabilityInvoker
// ---------------------------------------------------------------------------

/// Errors a capability invocation can surface.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// The host does not support this capability kind.
    #[error("unsupported capability kind: {0}")]
    Unsupported(String),

    /// The capability ran and failed.
    #[error("capability invocation failed: {0}")]
    Invoke(String),
}

/// Host-supplied executor for tool and action steps.
///
/// The engine hands over the step kind and the placeholder-resolved config
/// and gets back the capability's JSON output. How the host dispatches the
/// call (process, RPC, queue) is its own business.
pub trait CapabilityInvoker: Send + Sync {
    fn invoke(
        &self,
        kind: StepKind,
        config: &Value,
    ) -> impl std::future::Future<Output = Result<Value, CapabilityError>> + Send;
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Executes individual workflow steps by dispatching to kind-specific
/// handlers.
pub struct StepRunner<I> {
    invoker: I,
    evaluator: ConditionEvaluator,
}

impl<I: CapabilityInvoker> StepRunner<I> {
    /// Create a new step runner around a host capability invoker.
    pub fn new(invoker: I) -> Self {
        Self {
            invoker,
            evaluator: ConditionEvaluator::new(),
        }
    }

    /// Run a step and return its settled result.
    ///
    /// The step's config is resolved against the context before dispatch,
    /// so capability handlers only ever see concrete values.
    pub async fn run(&self, step: &Step, ctx: &ExecutionContext) -> StepResult {
        let context_value = ctx.to_value();
        let resolved = params::resolve(&step.config, &context_value);

        match step.kind {
            StepKind::Delay => self.run_delay(&step.id, &resolved).await,
            StepKind::Condition => self.run_condition(&step.id, &resolved, &context_value),
            StepKind::ToolCall | StepKind::ActionCall => {
                self.run_capability(&step.id, step.kind, &resolved).await
            }
        }
    }

    // -- Delay: sleeps delay_ms, capped at MAX_DELAY_MS --

    async fn run_delay(&self, step_id: &str, config: &Value) -> StepResult {
        let Some(requested) = config.get("delay_ms").and_then(Value::as_u64) else {
            return StepResult::failed(step_id, "delay step requires a numeric delay_ms");
        };

        let delay_ms = requested.min(MAX_DELAY_MS);
        if delay_ms < requested {
            tracing::warn!(step_id, requested, delay_ms, "delay capped");
        }

        tracing::debug!(step_id, delay_ms, "delay step sleeping");
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;

        StepResult::ok(step_id, json!({ "delayed_ms": delay_ms }))
    }

    // -- Condition: false is the failure branch, not an error --

    fn run_condition(&self, step_id: &str, config: &Value, context: &Value) -> StepResult {
        let Some(expression) = config.get("expression").and_then(Value::as_str) else {
            return StepResult::failed(step_id, "condition step requires an expression string");
        };

        match self.evaluator.evaluate(expression, context) {
            Ok(true) => {
                StepResult::ok(step_id, json!({ "expression": expression, "result": true }))
            }
            Ok(false) => {
                tracing::debug!(step_id, expression, "condition false, taking failure branch");
                StepResult {
                    step_id: step_id.to_string(),
                    success: false,
                    output: json!({ "expression": expression, "result": false }),
                    error: None,
                }
            }
            Err(e) => StepResult::failed(step_id, format!("condition evaluation failed: {e}")),
        }
    }

    // -- ToolCall / ActionCall: delegated to the host invoker --

    async fn run_capability(&self, step_id: &str, kind: StepKind, config: &Value) -> StepResult {
        tracing::debug!(step_id, kind = ?kind, "invoking capability");
        match self.invoker.invoke(kind, config).await {
            Ok(output) => StepResult::ok(step_id, output),
            Err(e) => StepResult::failed(step_id, e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
