//! Chain executor: sequential branch-following workflow execution.
//!
//! The `ChainExecutor` walks a workflow's step graph one step at a time,
//! following `on_success` / `on_failure` edges until a step with no outgoing
//! edge for its outcome settles the run. Every settled step is recorded into
//! the `ExecutionContext` and persisted through the `Recorder` before the
//! walk advances, so a crashed or failed run still has all prior results on
//! record.
//!
//! # Execution flow
//!
//! 1. Resolve the entry step (explicit `entry_step`, else the unique step no
//!    edge points at).
//! 2. Loop: check cancellation, run the current step, record its result,
//!    persist context, pick the next step from the outcome edge.
//! 3. On loop exit, persist the terminal status and publish `RunSettled`.
//!
//! Step failures are data (`StepResult { success: false }`) and branch via
//! `on_failure`; only structural problems (dangling step reference, missing
//! entry, step-limit breach, a failing `Recorder`) abort the run as errors.

use std::collections::HashSet;

use dashmap::DashMap;
use stepflow_types::error::HostError;
use stepflow_types::workflow::{RunStatus, Step, Workflow};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::{EngineEvent, EventBus};
use crate::recorder::Recorder;

use super::context::ExecutionContext;
use super::step_runner::{CapabilityInvoker, StepRunner};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum steps a single run may execute. Branch edges can form cycles, so
/// the walk carries a hard cap instead of assuming the graph is acyclic.
pub const MAX_STEPS_PER_RUN: usize = 1000;

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

/// Result of a settled workflow run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The run ID.
    pub run_id: Uuid,
    /// Terminal status of the run.
    pub status: RunStatus,
    /// Accumulated context (step results, variables).
    pub context: ExecutionContext,
    /// Error message from the last failed step, if the run failed with one.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// ChainExecutor
// ---------------------------------------------------------------------------

/// Sequential branch-following executor.
///
/// Generic over `I: CapabilityInvoker` (tool/action dispatch) and
/// `R: Recorder` (persistence) so hosts wire in their own implementations.
pub struct ChainExecutor<I, R> {
    step_runner: StepRunner<I>,
    recorder: R,
    event_bus: EventBus,
    /// Cancellation tokens keyed by run_id.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

impl<I: CapabilityInvoker, R: Recorder> ChainExecutor<I, R> {
    /// Create a new executor.
    pub fn new(invoker: I, recorder: R, event_bus: EventBus) -> Self {
        Self {
            step_runner: StepRunner::new(invoker),
            recorder,
            event_bus,
            cancellation_tokens: DashMap::new(),
        }
    }

    /// Execute a workflow from its entry step until a terminal status.
    ///
    /// Returns `Ok` for completed, failed, and cancelled runs alike; `Err`
    /// is reserved for structural problems and recorder failures.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        trigger_kind: &str,
        initiated_by: &str,
    ) -> Result<RunOutcome, ExecutorError> {
        // Validate the entry before registering anything.
        let entry = resolve_entry_step(workflow)?;

        let run_id = Uuid::now_v7();
        let cancel_token = CancellationToken::new();
        self.cancellation_tokens.insert(run_id, cancel_token.clone());

        let mut ctx = ExecutionContext::new(workflow, run_id, trigger_kind, initiated_by);

        self.event_bus.publish(EngineEvent::RunStarted {
            run_id,
            workflow_name: workflow.name.clone(),
            trigger_kind: trigger_kind.to_string(),
        });

        tracing::info!(
            run_id = %run_id,
            workflow = workflow.name.as_str(),
            entry = entry.id.as_str(),
            "starting workflow run"
        );

        let result = self
            .walk_chain(workflow, &entry.id, run_id, &mut ctx, &cancel_token)
            .await;

        self.cancellation_tokens.remove(&run_id);

        match result {
            Ok((status, error)) => {
                self.recorder
                    .on_run_settled(run_id, status, error.as_deref())
                    .await?;

                self.event_bus.publish(EngineEvent::RunSettled {
                    run_id,
                    status,
                    error: error.clone(),
                });

                tracing::info!(
                    run_id = %run_id,
                    status = ?status,
                    steps = ctx.steps().len(),
                    "workflow run settled"
                );

                Ok(RunOutcome {
                    run_id,
                    status,
                    context: ctx,
                    error,
                })
            }
            Err(e) => {
                let err_msg = e.to_string();
                // Best effort: the run is already broken, a failing recorder
                // must not mask the structural error.
                let _ = self
                    .recorder
                    .on_run_settled(run_id, RunStatus::Failed, Some(&err_msg))
                    .await;

                self.event_bus.publish(EngineEvent::RunSettled {
                    run_id,
                    status: RunStatus::Failed,
                    error: Some(err_msg.clone()),
                });

                tracing::error!(run_id = %run_id, error = err_msg.as_str(), "workflow run aborted");
                Err(e)
            }
        }
    }

    /// Cancel a running workflow.
    ///
    /// Cooperative: the in-flight step settles and is recorded first, then
    /// the run ends `Cancelled` before the next step starts.
    pub fn cancel(&self, run_id: Uuid) -> Result<(), ExecutorError> {
        match self.cancellation_tokens.get(&run_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(run_id = %run_id, "workflow run cancellation requested");
                Ok(())
            }
            None => Err(ExecutorError::RunNotFound(run_id)),
        }
    }

    /// Walk the branch chain until a terminal status.
    async fn walk_chain(
        &self,
        workflow: &Workflow,
        entry_id: &str,
        run_id: Uuid,
        ctx: &mut ExecutionContext,
        cancel_token: &CancellationToken,
    ) -> Result<(RunStatus, Option<String>), ExecutorError> {
        let mut current = entry_id.to_string();
        let mut executed = 0usize;

        loop {
            // Checked at the top of the loop: the previous step's result has
            // already been recorded and persisted.
            if cancel_token.is_cancelled() {
                return Ok((RunStatus::Cancelled, None));
            }

            if executed >= MAX_STEPS_PER_RUN {
                return Err(ExecutorError::StepLimitExceeded(MAX_STEPS_PER_RUN));
            }
            executed += 1;

            let step = workflow
                .step(&current)
                .ok_or_else(|| ExecutorError::StepNotFound(current.clone()))?;

            self.event_bus.publish(EngineEvent::StepStarted {
                run_id,
                step_id: step.id.clone(),
                step_name: step.name.clone(),
            });

            tracing::debug!(
                run_id = %run_id,
                step_id = step.id.as_str(),
                kind = ?step.kind,
                "running step"
            );

            let start = std::time::Instant::now();
            let result = self.step_runner.run(step, ctx).await;
            let success = result.success;
            let step_error = result.error.clone();

            self.event_bus.publish(EngineEvent::StepSettled {
                run_id,
                step_id: step.id.clone(),
                success,
                duration_ms: start.elapsed().as_millis() as u64,
            });

            self.recorder
                .on_step_settled(run_id, &step.id, &result)
                .await?;

            ctx.record_step(result);
            self.recorder.on_context_update(run_id, ctx).await?;

            let next = if success { &step.on_success } else { &step.on_failure };
            match next {
                Some(next_id) => current = next_id.clone(),
                None if success => return Ok((RunStatus::Completed, None)),
                None => return Ok((RunStatus::Failed, step_error)),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry resolution
// ---------------------------------------------------------------------------

/// Resolve the step a run begins at.
///
/// An explicit `entry_step` wins (and must name an existing step). Without
/// one, the entry is the unique step no `on_success` / `on_failure` edge
/// points at; zero or several such steps make the workflow invalid.
pub fn resolve_entry_step(workflow: &Workflow) -> Result<&Step, ExecutorError> {
    if let Some(entry_id) = &workflow.entry_step {
        return workflow
            .step(entry_id)
            .ok_or_else(|| ExecutorError::StepNotFound(entry_id.clone()));
    }

    let referenced: HashSet<&str> = workflow
        .steps
        .iter()
        .flat_map(|s| [s.on_success.as_deref(), s.on_failure.as_deref()])
        .flatten()
        .collect();

    let mut candidates = workflow
        .steps
        .iter()
        .filter(|s| !referenced.contains(s.id.as_str()));

    match (candidates.next(), candidates.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(ExecutorError::NoEntryStep(workflow.name.clone())),
    }
}

// ---------------------------------------------------------------------------
// ExecutorError
// ---------------------------------------------------------------------------

/// Structural errors that abort a workflow run.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// No unambiguous entry step could be resolved.
    #[error("workflow '{0}' has no unambiguous entry step")]
    NoEntryStep(String),

    /// A branch edge or explicit entry names a step that does not exist.
    #[error("step '{0}' not found in workflow")]
    StepNotFound(String),

    /// The run executed more steps than the cycle guard allows.
    #[error("run exceeded the {0} step limit")]
    StepLimitExceeded(usize),

    /// Run not found (for cancel).
    #[error("workflow run not found: {0}")]
    RunNotFound(Uuid),

    /// The recorder failed to persist run state.
    #[error("recorder error: {0}")]
    Recorder(#[from] HostError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use serde_json::{Value, json};
    use stepflow_types::workflow::{StepKind, StepResult, TriggerDescriptor};
    use tokio::sync::Notify;

    use crate::workflow::step_runner::CapabilityError;

    // -------------------------------------------------------------------
    // Test doubles
    // -------------------------------------------------------------------

    /// Invoker that succeeds unless the resolved config sets `"fail": true`.
    struct ScriptedInvoker;

    impl CapabilityInvoker for ScriptedInvoker {
        async fn invoke(&self, _kind: StepKind, config: &Value) -> Result<Value, CapabilityError> {
            if config.get("fail").and_then(Value::as_bool).unwrap_or(false) {
                Err(CapabilityError::Invoke("scripted failure".to_string()))
            } else {
                Ok(json!({ "echo": config }))
            }
        }
    }

    /// Invoker that blocks until the test releases it.
    struct GatedInvoker {
        gate: Arc<Notify>,
    }

    impl CapabilityInvoker for GatedInvoker {
        async fn invoke(&self, _kind: StepKind, config: &Value) -> Result<Value, CapabilityError> {
            self.gate.notified().await;
            Ok(json!({ "echo": config }))
        }
    }

    #[derive(Default)]
    struct RecorderLog {
        context_updates: usize,
        settled_steps: Vec<String>,
        run: Option<(RunStatus, Option<String>)>,
    }

    /// In-memory recorder capturing every hook invocation.
    #[derive(Default, Clone)]
    struct MemoryRecorder {
        log: Arc<Mutex<RecorderLog>>,
    }

    impl Recorder for MemoryRecorder {
        async fn on_context_update(
            &self,
            _run_id: Uuid,
            _context: &ExecutionContext,
        ) -> Result<(), HostError> {
            self.log.lock().unwrap().context_updates += 1;
            Ok(())
        }

        async fn on_step_settled(
            &self,
            _run_id: Uuid,
            step_id: &str,
            _result: &StepResult,
        ) -> Result<(), HostError> {
            self.log.lock().unwrap().settled_steps.push(step_id.to_string());
            Ok(())
        }

        async fn on_run_settled(
            &self,
            _run_id: Uuid,
            status: RunStatus,
            error: Option<&str>,
        ) -> Result<(), HostError> {
            self.log.lock().unwrap().run = Some((status, error.map(str::to_string)));
            Ok(())
        }
    }

    fn step(id: &str, kind: StepKind, config: Value) -> Step {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            config,
            on_success: None,
            on_failure: None,
        }
    }

    fn workflow(steps: Vec<Step>) -> Workflow {
        Workflow {
            id: Uuid::now_v7(),
            name: "test-flow".to_string(),
            steps,
            entry_step: None,
            trigger: TriggerDescriptor::Manual,
            active: true,
            draft: false,
            version: 1,
            created_by: "tester".to_string(),
        }
    }

    fn executor() -> ChainExecutor<ScriptedInvoker, MemoryRecorder> {
        ChainExecutor::new(ScriptedInvoker, MemoryRecorder::default(), EventBus::new(64))
    }

    // -------------------------------------------------------------------
    // Entry resolution
    // -------------------------------------------------------------------

    #[test]
    fn entry_is_the_step_no_edge_points_at() {
        // Declared out of order; "start" is unreferenced and wins.
        let mut second = step("second", StepKind::ToolCall, json!({}));
        second.on_success = None;
        let mut start = step("start", StepKind::ToolCall, json!({}));
        start.on_success = Some("second".to_string());

        let wf = workflow(vec![second, start]);
        assert_eq!(resolve_entry_step(&wf).unwrap().id, "start");
    }

    #[test]
    fn ambiguous_entry_is_rejected() {
        // Two unreferenced steps.
        let wf = workflow(vec![
            step("a", StepKind::ToolCall, json!({})),
            step("b", StepKind::ToolCall, json!({})),
        ]);
        assert!(matches!(
            resolve_entry_step(&wf),
            Err(ExecutorError::NoEntryStep(_))
        ));
    }

    #[test]
    fn empty_workflow_has_no_entry() {
        let wf = workflow(vec![]);
        assert!(matches!(
            resolve_entry_step(&wf),
            Err(ExecutorError::NoEntryStep(_))
        ));
    }

    #[test]
    fn explicit_entry_overrides_inference() {
        let mut wf = workflow(vec![
            step("a", StepKind::ToolCall, json!({})),
            step("b", StepKind::ToolCall, json!({})),
        ]);
        wf.entry_step = Some("b".to_string());
        assert_eq!(resolve_entry_step(&wf).unwrap().id, "b");
    }

    #[test]
    fn explicit_entry_must_exist() {
        let mut wf = workflow(vec![step("a", StepKind::ToolCall, json!({}))]);
        wf.entry_step = Some("ghost".to_string());
        assert!(matches!(
            resolve_entry_step(&wf),
            Err(ExecutorError::StepNotFound(id)) if id == "ghost"
        ));
    }

    // -------------------------------------------------------------------
    // Branch following
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn success_path_follows_on_success() {
        let mut a = step("a", StepKind::ToolCall, json!({ "n": 1 }));
        a.on_success = Some("b".to_string());
        a.on_failure = Some("cleanup".to_string());
        let b = step("b", StepKind::ToolCall, json!({ "n": 2 }));
        let cleanup = step("cleanup", StepKind::ToolCall, json!({}));

        let mut wf = workflow(vec![a, b, cleanup]);
        wf.entry_step = Some("a".to_string());

        let outcome = executor().execute(&wf, "manual", "tester").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        let ids: Vec<&str> = outcome.context.steps().iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failure_path_follows_on_failure() {
        let mut a = step("a", StepKind::ToolCall, json!({ "fail": true }));
        a.on_success = Some("b".to_string());
        a.on_failure = Some("cleanup".to_string());
        let b = step("b", StepKind::ToolCall, json!({}));
        let cleanup = step("cleanup", StepKind::ToolCall, json!({}));

        let mut wf = workflow(vec![a, b, cleanup]);
        wf.entry_step = Some("a".to_string());

        let outcome = executor().execute(&wf, "manual", "tester").await.unwrap();
        // Cleanup itself succeeds, so the run completes.
        assert_eq!(outcome.status, RunStatus::Completed);
        let ids: Vec<&str> = outcome.context.steps().iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "cleanup"]);
        assert!(!outcome.context.step_result("a").unwrap().success);
    }

    #[tokio::test]
    async fn failed_run_keeps_prior_results_and_error() {
        let mut a = step("a", StepKind::ToolCall, json!({ "n": 1 }));
        a.on_success = Some("b".to_string());
        let b = step("b", StepKind::ToolCall, json!({ "fail": true }));

        let exec = executor();
        let wf = workflow(vec![a, b]);
        let outcome = exec.execute(&wf, "manual", "tester").await.unwrap();

        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.error.as_deref().unwrap().contains("scripted failure"));
        assert_eq!(outcome.context.steps().len(), 2);
        assert!(outcome.context.step_result("a").unwrap().success);
    }

    #[tokio::test]
    async fn condition_false_ends_run_failed_without_error() {
        let mut probe = step("probe", StepKind::ToolCall, json!({ "n": 1 }));
        probe.on_success = Some("check".to_string());
        let mut check = step(
            "check",
            StepKind::Condition,
            json!({ "expression": "steps.probe.output.echo.n == 2" }),
        );
        check.on_success = Some("act".to_string());
        let act = step("act", StepKind::ToolCall, json!({}));

        let wf = workflow(vec![probe, check, act]);
        let outcome = executor().execute(&wf, "manual", "tester").await.unwrap();

        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.error.is_none());
        assert!(outcome.context.step_result("act").is_none());
    }

    // -------------------------------------------------------------------
    // Structural errors
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn dangling_branch_target_aborts_run() {
        let mut a = step("a", StepKind::ToolCall, json!({}));
        a.on_success = Some("ghost".to_string());

        let recorder = MemoryRecorder::default();
        let exec = ChainExecutor::new(ScriptedInvoker, recorder.clone(), EventBus::new(16));
        let err = exec
            .execute(&workflow(vec![a]), "manual", "tester")
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::StepNotFound(id) if id == "ghost"));
        // The abort is still persisted as a failed run.
        let log = recorder.log.lock().unwrap();
        assert_eq!(log.run.as_ref().unwrap().0, RunStatus::Failed);
    }

    #[tokio::test]
    async fn cyclic_graph_hits_the_step_limit() {
        let mut a = step("a", StepKind::ToolCall, json!({}));
        a.on_success = Some("b".to_string());
        let mut b = step("b", StepKind::ToolCall, json!({}));
        b.on_success = Some("a".to_string());

        let mut wf = workflow(vec![a, b]);
        wf.entry_step = Some("a".to_string());

        let err = executor().execute(&wf, "manual", "tester").await.unwrap_err();
        assert!(matches!(err, ExecutorError::StepLimitExceeded(MAX_STEPS_PER_RUN)));
    }

    // -------------------------------------------------------------------
    // Recorder hooks
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn recorder_sees_every_step_and_one_terminal() {
        let mut a = step("a", StepKind::ToolCall, json!({}));
        a.on_success = Some("b".to_string());
        let b = step("b", StepKind::ToolCall, json!({}));

        let recorder = MemoryRecorder::default();
        let exec = ChainExecutor::new(ScriptedInvoker, recorder.clone(), EventBus::new(16));
        exec.execute(&workflow(vec![a, b]), "manual", "tester")
            .await
            .unwrap();

        let log = recorder.log.lock().unwrap();
        assert_eq!(log.settled_steps, vec!["a", "b"]);
        assert_eq!(log.context_updates, 2);
        assert_eq!(log.run.as_ref().unwrap().0, RunStatus::Completed);
    }

    // -------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn cancel_lets_inflight_step_settle_then_ends_cancelled() {
        let gate = Arc::new(Notify::new());
        let mut a = step("a", StepKind::ToolCall, json!({}));
        a.on_success = Some("b".to_string());
        let b = step("b", StepKind::ToolCall, json!({}));

        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let exec = Arc::new(ChainExecutor::new(
            GatedInvoker { gate: Arc::clone(&gate) },
            MemoryRecorder::default(),
            bus,
        ));

        let wf = workflow(vec![a, b]);
        let handle = tokio::spawn({
            let exec = Arc::clone(&exec);
            async move { exec.execute(&wf, "manual", "tester").await }
        });

        // Wait for the run to start, then cancel while step "a" is gated.
        let run_id = loop {
            match rx.recv().await.unwrap() {
                EngineEvent::StepStarted { run_id, .. } => break run_id,
                _ => continue,
            }
        };
        exec.cancel(run_id).unwrap();
        gate.notify_one();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.status, RunStatus::Cancelled);
        // The in-flight step settled and was recorded.
        assert!(outcome.context.step_result("a").unwrap().success);
        assert!(outcome.context.step_result("b").is_none());
    }

    #[tokio::test]
    async fn cancel_unknown_run_is_an_error() {
        let exec = executor();
        assert!(matches!(
            exec.cancel(Uuid::now_v7()),
            Err(ExecutorError::RunNotFound(_))
        ));
    }

    // -------------------------------------------------------------------
    // End to end: delay then condition on its output
    // -------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn delay_then_condition_reads_prior_output() {
        let mut wait = step("wait", StepKind::Delay, json!({ "delay_ms": 50 }));
        wait.on_success = Some("check".to_string());
        let mut check = step(
            "check",
            StepKind::Condition,
            json!({ "expression": "steps.wait.output.delayed_ms == 50" }),
        );
        check.on_success = Some("done".to_string());
        let done = step("done", StepKind::ToolCall, json!({ "note": "finished" }));

        let wf = workflow(vec![wait, check, done]);
        let outcome = executor().execute(&wf, "manual", "tester").await.unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        let ids: Vec<&str> = outcome.context.steps().iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(ids, vec!["wait", "check", "done"]);
    }
}
