//! Scheduler-side task types.
//!
//! A `Task` is the scheduler's unit of work: either a scheduled workflow run
//! or a direct prompt execution. Tasks are produced by the host's
//! source-of-truth store; the scheduler reads them, executes them, and
//! reports a `TaskOutcome` back for persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A scheduler-level unit of recurring or one-time work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// UUIDv7 task ID.
    pub id: Uuid,
    /// Human-readable task name.
    pub name: String,
    /// What executing this task means.
    pub kind: TaskKind,
    /// Cron expression for recurring tasks (None for one-shot tasks created
    /// with an explicit `next_run`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// When this task should next run.
    pub next_run: DateTime<Utc>,
    /// One-time tasks are disabled after their first successful run.
    #[serde(default)]
    pub do_only_once: bool,
    /// Number of retry attempts already recorded against this task.
    #[serde(default)]
    pub retry_count: u32,
    /// Whether the most recent execution of this task failed.
    #[serde(default)]
    pub last_failed: bool,
    /// When the task was created (staleness input for priority).
    pub created_at: DateTime<Utc>,
    /// Disabled tasks are never polled as ready.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// User ID of the task's creator.
    pub created_by: String,
}

fn default_true() -> bool {
    true
}

/// What executing a task means.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Run a stored workflow end to end.
    Workflow { workflow_id: Uuid },
    /// Execute a stored prompt directly (no step graph).
    Prompt { prompt: String },
}

// ---------------------------------------------------------------------------
// TaskOutcome
// ---------------------------------------------------------------------------

/// Completion descriptor reported to the host after a task settles.
///
/// The scheduler computes everything the host needs to persist: the next-run
/// timestamp for recurring tasks, the disable flag for one-time tasks, and
/// the final error plus attempt count for exhausted tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed {
        /// Runner output payload.
        output: serde_json::Value,
        /// Next scheduled run, computed from the task's cron schedule.
        /// `None` for one-time tasks.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_run: Option<DateTime<Utc>>,
        /// Whether the host should disable the task (one-time tasks).
        disable: bool,
    },
    Failed {
        /// The last error observed.
        error: String,
        /// Total attempts made, including the first.
        attempts: u32,
    },
}
