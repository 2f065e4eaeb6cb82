//! Per-run execution context.
//!
//! `ExecutionContext` is the mutable state threaded through a single workflow
//! run: workflow and execution metadata, the step results accumulated so far
//! (in execution order), and a free-form variables bag for cross-step data.
//! It is created once per run, mutated in place by the executor after every
//! step, serialized to the `Recorder` after every mutation, and discarded
//! when the run ends.
//!
//! `to_value` builds the `{workflow, execution, steps, variables}` mapping
//! that condition expressions and `{{path}}` placeholders resolve against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use stepflow_types::workflow::{StepResult, Workflow};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Workflow identity carried in the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMeta {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
}

/// Run identity carried in the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMeta {
    pub run_id: Uuid,
    /// How the run was triggered (e.g. "manual", "schedule").
    pub trigger_kind: String,
    pub started_at: DateTime<Utc>,
    /// User on whose behalf the run executes.
    pub initiated_by: String,
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Mutable state owned by a single in-flight workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Workflow metadata.
    pub workflow: WorkflowMeta,
    /// Execution metadata.
    pub execution: ExecutionMeta,
    /// Step results in execution order.
    steps: Vec<StepResult>,
    /// Free-form variables bag for cross-step data.
    pub variables: Map<String, Value>,
}

impl ExecutionContext {
    /// Create a fresh context for a new run.
    pub fn new(workflow: &Workflow, run_id: Uuid, trigger_kind: &str, initiated_by: &str) -> Self {
        Self {
            workflow: WorkflowMeta {
                id: workflow.id,
                name: workflow.name.clone(),
                version: workflow.version,
            },
            execution: ExecutionMeta {
                run_id,
                trigger_kind: trigger_kind.to_string(),
                started_at: Utc::now(),
                initiated_by: initiated_by.to_string(),
            },
            steps: Vec::new(),
            variables: Map::new(),
        }
    }

    /// Record a settled step result.
    ///
    /// Results are kept in execution order; re-executing a step (a graph may
    /// branch back to an earlier step) replaces its result in place.
    pub fn record_step(&mut self, result: StepResult) {
        match self.steps.iter_mut().find(|r| r.step_id == result.step_id) {
            Some(existing) => *existing = result,
            None => self.steps.push(result),
        }
    }

    /// Get the recorded result for a step, if it has settled.
    pub fn step_result(&self, step_id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|r| r.step_id == step_id)
    }

    /// Step results in execution order.
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Set a cross-step variable.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Build the JSON mapping that expressions and placeholders resolve
    /// against.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "workflow": { "id": "...", "name": "...", "version": 1 },
    ///   "execution": { "run_id": "...", "trigger_kind": "manual", ... },
    ///   "steps": { "<step_id>": { "success": true, "output": ..., "error": null }, ... },
    ///   "variables": { ... }
    /// }
    /// ```
    ///
    /// `steps` keys appear in execution order.
    pub fn to_value(&self) -> Value {
        let mut steps = Map::new();
        for result in &self.steps {
            steps.insert(
                result.step_id.clone(),
                json!({
                    "success": result.success,
                    "output": result.output,
                    "error": result.error,
                }),
            );
        }

        json!({
            "workflow": {
                "id": self.workflow.id.to_string(),
                "name": self.workflow.name,
                "version": self.workflow.version,
            },
            "execution": {
                "run_id": self.execution.run_id.to_string(),
                "trigger_kind": self.execution.trigger_kind,
                "started_at": self.execution.started_at.to_rfc3339(),
                "initiated_by": self.execution.initiated_by,
            },
            "steps": Value::Object(steps),
            "variables": self.variables,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
