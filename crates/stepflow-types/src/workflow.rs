//! Workflow domain types for Stepflow.
//!
//! A workflow is a directed graph of steps: each step names the step to run
//! after it succeeds (`on_success`) and the step to run after it fails
//! (`on_failure`). The executor walks that graph from the entry step to a
//! terminal status. This module defines the graph shape and the per-step
//! result record; execution lives in `stepflow-core`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A named, versioned graph of steps with a trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on first save.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Steps forming the branch graph. Step IDs are unique within a workflow.
    pub steps: Vec<Step>,
    /// Explicit entry step ID. When `None`, the entry is the unique step not
    /// referenced by any other step's `on_success`/`on_failure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_step: Option<String>,
    /// How this workflow is triggered.
    pub trigger: TriggerDescriptor,
    /// Whether the workflow is eligible to run.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Draft workflows are editable but never scheduled.
    #[serde(default)]
    pub draft: bool,
    /// Bumped by every update operation.
    #[serde(default)]
    pub version: u32,
    /// User ID of the workflow's creator (owner).
    pub created_by: String,
}

fn default_true() -> bool {
    true
}

impl Workflow {
    /// Look up a step by its ID.
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

/// How a workflow can be triggered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerDescriptor {
    /// Triggered on demand via API or CLI.
    Manual,
    /// Triggered on a recurring cron schedule.
    Schedule {
        /// Cron expression or human-readable schedule string.
        schedule: String,
    },
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// User-defined step ID (e.g. "gather-data"). Unique within a workflow.
    pub id: String,
    /// Human-readable step name.
    pub name: String,
    /// The kind of step.
    pub kind: StepKind,
    /// Kind-specific configuration tree. String leaves may be `{{path}}`
    /// placeholders resolved against the execution context.
    #[serde(default)]
    pub config: Value,
    /// Step to run next when this step succeeds. `None` completes the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
    /// Step to run next when this step fails. `None` fails the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
}

/// The kind of step in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Pause for a configured number of milliseconds.
    Delay,
    /// Evaluate a boolean expression; `false` takes the failure branch.
    Condition,
    /// Invoke an MCP tool through the host's capability invoker.
    ToolCall,
    /// Invoke an external-app action through the host's capability invoker.
    ActionCall,
}

// ---------------------------------------------------------------------------
// Execution status / results
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Whether this status is terminal (the run will not mutate further).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// The settled outcome of one step execution. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// ID of the step that produced this result.
    pub step_id: String,
    /// Whether the step succeeded (drives `on_success`/`on_failure` branching).
    pub success: bool,
    /// Kind-specific result payload.
    pub output: Value,
    /// Error message when the step failed because of an error. A condition
    /// step that evaluates to `false` fails with no error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// Build a successful result.
    pub fn ok(step_id: impl Into<String>, output: Value) -> Self {
        Self {
            step_id: step_id.into(),
            success: true,
            output,
            error: None,
        }
    }

    /// Build a failed result carrying an error message.
    pub fn failed(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            success: false,
            output: Value::Null,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
