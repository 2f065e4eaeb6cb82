//! Polling task scheduler with priority queues, retry, and graceful shutdown.
//!
//! The scheduler owns two in-memory queues:
//! - the **primary** queue, fed by a periodic poll of the host's task store,
//!   drained with bounded concurrency and a rolling per-minute dispatch
//!   budget
//! - the **retry** queue, fed by transient failures, drained one at a time
//!   after an exponential backoff delay
//!
//! The host's store stays the source of truth: the scheduler reads ready
//! tasks through `TaskSource`, executes them through `TaskRunner`, and
//! reports every settled task back through `TaskSink` with everything the
//! host needs to persist (next-run timestamp, disable flag, final error and
//! attempt count). A restart loses nothing but in-memory queue positions;
//! the next poll repopulates them.

pub mod priority;
pub mod queue;
pub mod retry;
pub mod schedule;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use stepflow_types::error::HostError;
use stepflow_types::task::{Task, TaskOutcome};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::event::{EngineEvent, EventBus};

use priority::task_priority;
use queue::{QueueEntry, WorkQueue};
use retry::{RetryClass, backoff_delay, classify};
use schedule::next_occurrence;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the host's store is polled for ready tasks.
    pub poll_interval: Duration,
    /// Maximum tasks executing from the primary queue at once.
    pub primary_concurrency: usize,
    /// Rolling dispatch budget for the primary queue: at most this many
    /// dispatches within any 60-second window. 0 means unlimited.
    pub dispatch_budget_per_minute: usize,
    /// Base delay before the first retry.
    pub retry_base_delay: Duration,
    /// Ceiling on the exponential backoff delay.
    pub retry_max_delay: Duration,
    /// Total attempts per task, including the first.
    pub max_attempts: u32,
    /// How long `stop` waits for in-flight work before giving up.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            primary_concurrency: 3,
            dispatch_budget_per_minute: 10,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            max_attempts: 3,
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Host traits
// ---------------------------------------------------------------------------

/// Errors a task execution can surface.
#[derive(Debug, thiserror::Error)]
pub enum TaskRunError {
    /// The task ran and failed. The message drives retry classification.
    #[error("{0}")]
    Failed(String),

    /// The runner could not reach its backing store or service.
    #[error("host error: {0}")]
    Host(#[from] HostError),
}

/// Read side of the host's task store.
pub trait TaskSource: Send + Sync {
    /// Enabled tasks whose `next_run` has arrived.
    fn poll_ready_tasks(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, HostError>> + Send;
}

/// Write side of the host's task store.
pub trait TaskSink: Send + Sync {
    /// Persist a settled task's outcome (next run, disable flag, failure).
    fn on_task_settled(
        &self,
        task: &Task,
        outcome: &TaskOutcome,
    ) -> impl std::future::Future<Output = Result<(), HostError>> + Send;
}

/// Executes a task's payload (workflow run or prompt).
///
/// The token is the cooperative cancellation seam: implementations watch it
/// (a workflow runner bridges it to `ChainExecutor::cancel`) and return once
/// their current unit of work settles. The scheduler always awaits the
/// returned future to completion; it never drops an in-flight call.
pub trait TaskRunner: Send + Sync {
    fn run(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<Value, TaskRunError>> + Send;
}

// ---------------------------------------------------------------------------
// SchedulerError
// ---------------------------------------------------------------------------

/// Errors from scheduler lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// `start` was called on an already-started scheduler.
    #[error("scheduler already started")]
    AlreadyStarted,

    /// Task not found among running tasks (for cancel).
    #[error("task {0} is not running")]
    TaskNotFound(Uuid),
}

// ---------------------------------------------------------------------------
// DispatchBudget
// ---------------------------------------------------------------------------

/// Rolling-window rate limit on primary-queue dispatches.
struct DispatchBudget {
    window: Duration,
    limit: usize,
    stamps: Mutex<VecDeque<Instant>>,
}

impl DispatchBudget {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            window,
            limit,
            stamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a dispatch slot is free within the rolling window, then
    /// claim it.
    async fn acquire(&self) {
        if self.limit == 0 {
            return;
        }
        loop {
            let wait_until = {
                let mut stamps = self.stamps.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                while stamps
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    stamps.pop_front();
                }
                if stamps.len() < self.limit {
                    stamps.push_back(now);
                    return;
                }
                match stamps.front() {
                    Some(oldest) => *oldest + self.window,
                    None => return,
                }
            };
            tokio::time::sleep_until(wait_until).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Task scheduler generic over the host's store and runner.
pub struct Scheduler<S, K, R> {
    source: Arc<S>,
    sink: Arc<K>,
    runner: Arc<R>,
    config: SchedulerConfig,
    event_bus: EventBus,
    primary: Arc<WorkQueue>,
    retry_queue: Arc<WorkQueue>,
    /// Cancellation tokens for in-flight tasks, keyed by task_id.
    running: Arc<DashMap<Uuid, CancellationToken>>,
    budget: Arc<DispatchBudget>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    started: AtomicBool,
}

impl<S, K, R> Scheduler<S, K, R>
where
    S: TaskSource + 'static,
    K: TaskSink + 'static,
    R: TaskRunner + 'static,
{
    /// Create a new scheduler (not yet started).
    pub fn new(source: S, sink: K, runner: R, config: SchedulerConfig, event_bus: EventBus) -> Self {
        let budget = Arc::new(DispatchBudget::new(
            config.dispatch_budget_per_minute,
            Duration::from_secs(60),
        ));
        Self {
            source: Arc::new(source),
            sink: Arc::new(sink),
            runner: Arc::new(runner),
            config,
            event_bus,
            primary: Arc::new(WorkQueue::new()),
            retry_queue: Arc::new(WorkQueue::new()),
            running: Arc::new(DashMap::new()),
            budget,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Start the poll loop and both queue dispatchers.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        self.spawn_poll_loop();
        self.spawn_primary_dispatcher();
        self.spawn_retry_dispatcher();

        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            concurrency = self.config.primary_concurrency,
            "scheduler started"
        );
        Ok(())
    }

    /// Stop the scheduler: halt polling, pause the queues, wait up to
    /// `shutdown_timeout` for in-flight tasks, then discard queued entries.
    ///
    /// Returns whether all in-flight work drained within the timeout.
    pub async fn stop(&self) -> bool {
        self.shutdown.cancel();
        self.primary.pause();
        self.retry_queue.pause();

        self.tracker.close();
        let drained = tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait())
            .await
            .is_ok();

        let dropped = self.primary.clear() + self.retry_queue.clear();
        if dropped > 0 {
            tracing::info!(dropped, "discarded queued tasks on shutdown");
        }

        self.event_bus.publish(EngineEvent::SchedulerStopped { drained });
        tracing::info!(drained, "scheduler stopped");
        drained
    }

    /// Cancel an in-flight task. Cooperative: the runner observes the token
    /// and settles its current unit of work first; no outcome is reported to
    /// the sink.
    pub fn cancel_task(&self, task_id: Uuid) -> Result<(), SchedulerError> {
        match self.running.get(&task_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(task_id = %task_id, "task cancellation requested");
                Ok(())
            }
            None => Err(SchedulerError::TaskNotFound(task_id)),
        }
    }

    /// Number of tasks waiting across both queues.
    pub fn queued(&self) -> usize {
        self.primary.len() + self.retry_queue.len()
    }

    /// Number of tasks currently executing.
    pub fn running(&self) -> usize {
        self.running.len()
    }

    fn dispatch_ctx(&self) -> DispatchCtx<K, R> {
        DispatchCtx {
            sink: Arc::clone(&self.sink),
            runner: Arc::clone(&self.runner),
            retry_queue: Arc::clone(&self.retry_queue),
            running: Arc::clone(&self.running),
            event_bus: self.event_bus.clone(),
            config: self.config.clone(),
        }
    }

    fn spawn_poll_loop(&self) {
        let source = Arc::clone(&self.source);
        let primary = Arc::clone(&self.primary);
        let retry_queue = Arc::clone(&self.retry_queue);
        let running = Arc::clone(&self.running);
        let shutdown = self.shutdown.clone();
        let poll_interval = self.config.poll_interval;

        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match source.poll_ready_tasks().await {
                    Ok(tasks) => {
                        let now = Utc::now();
                        for task in tasks {
                            if !task.enabled {
                                continue;
                            }
                            // Already queued or in flight: the store will
                            // offer it again on a later poll if still ready.
                            if primary.contains(task.id)
                                || retry_queue.contains(task.id)
                                || running.contains_key(&task.id)
                            {
                                continue;
                            }

                            let priority = task_priority(&task, now);
                            tracing::debug!(
                                task_id = %task.id,
                                task = task.name.as_str(),
                                priority,
                                "task enqueued"
                            );
                            primary.push(task, priority, 1, None);
                        }
                    }
                    Err(e) => {
                        // Poll failures are transient; the loop keeps going.
                        tracing::warn!(error = %e, "task poll failed");
                    }
                }
            }
        });
    }

    fn spawn_primary_dispatcher(&self) {
        let primary = Arc::clone(&self.primary);
        let budget = Arc::clone(&self.budget);
        let shutdown = self.shutdown.clone();
        let tracker = self.tracker.clone();
        let semaphore = Arc::new(Semaphore::new(self.config.primary_concurrency));
        let ctx = self.dispatch_ctx();

        self.tracker.spawn(async move {
            loop {
                let entry = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    entry = primary.next() => entry,
                };

                // Registered before any waiting so a concurrent poll sees the
                // task as in flight and does not enqueue it twice.
                let token = CancellationToken::new();
                ctx.running.insert(entry.task.id, token.clone());

                tokio::select! {
                    _ = shutdown.cancelled() => {
                        ctx.running.remove(&entry.task.id);
                        break;
                    }
                    _ = budget.acquire() => {}
                }

                let permit = tokio::select! {
                    _ = shutdown.cancelled() => {
                        ctx.running.remove(&entry.task.id);
                        break;
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => {
                            ctx.running.remove(&entry.task.id);
                            break;
                        }
                    },
                };

                let ctx = ctx.clone();
                tracker.spawn(async move {
                    let _permit = permit;
                    execute_entry(ctx, entry, token).await;
                });
            }
        });
    }

    fn spawn_retry_dispatcher(&self) {
        let retry_queue = Arc::clone(&self.retry_queue);
        let shutdown = self.shutdown.clone();
        let ctx = self.dispatch_ctx();

        self.tracker.spawn(async move {
            loop {
                let entry = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    entry = retry_queue.next() => entry,
                };

                // Registered before the backoff wait so a concurrent poll
                // sees the task as in flight.
                let token = CancellationToken::new();
                ctx.running.insert(entry.task.id, token.clone());

                if let Some(not_before) = entry.not_before {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            ctx.running.remove(&entry.task.id);
                            break;
                        }
                        _ = tokio::time::sleep_until(not_before) => {}
                    }
                }

                // Awaiting inline keeps retry concurrency at one.
                execute_entry(ctx.clone(), entry, token).await;
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Task execution
// ---------------------------------------------------------------------------

/// Everything a dispatched entry needs, detached from the scheduler's
/// lifetime so it can move into spawned tasks.
struct DispatchCtx<K, R> {
    sink: Arc<K>,
    runner: Arc<R>,
    retry_queue: Arc<WorkQueue>,
    running: Arc<DashMap<Uuid, CancellationToken>>,
    event_bus: EventBus,
    config: SchedulerConfig,
}

impl<K, R> Clone for DispatchCtx<K, R> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            runner: Arc::clone(&self.runner),
            retry_queue: Arc::clone(&self.retry_queue),
            running: Arc::clone(&self.running),
            event_bus: self.event_bus.clone(),
            config: self.config.clone(),
        }
    }
}

/// Run one dequeued task to a settled state.
///
/// Never returns an error: retriable failures go back on the retry queue,
/// everything else is reported to the sink, and sink failures are logged.
async fn execute_entry<K: TaskSink, R: TaskRunner>(
    ctx: DispatchCtx<K, R>,
    entry: QueueEntry,
    token: CancellationToken,
) {
    let task = entry.task;
    let attempt = entry.attempt;

    ctx.event_bus.publish(EngineEvent::TaskStarted {
        task_id: task.id,
        attempt,
    });
    tracing::info!(
        task_id = %task.id,
        task = task.name.as_str(),
        attempt,
        "executing task"
    );

    let start = Instant::now();
    // Always awaited to completion; cancellation reaches the runner through
    // the token so an in-flight capability call settles before the task does.
    let run = ctx.runner.run(&task, &token).await;

    if token.is_cancelled() {
        ctx.running.remove(&task.id);
        // The host asked for the cancellation, nothing to report.
        tracing::info!(task_id = %task.id, "task cancelled");
        return;
    }

    match run {
        Ok(output) => {
            ctx.running.remove(&task.id);
            let next_run = if task.do_only_once {
                None
            } else {
                task.schedule.as_deref().and_then(|s| {
                    match next_occurrence(s, Utc::now()) {
                        Ok(t) => Some(t),
                        Err(e) => {
                            tracing::warn!(
                                task_id = %task.id,
                                error = %e,
                                "could not compute next run"
                            );
                            None
                        }
                    }
                })
            };

            let outcome = TaskOutcome::Completed {
                output,
                next_run,
                disable: task.do_only_once,
            };
            if let Err(e) = ctx.sink.on_task_settled(&task, &outcome).await {
                tracing::error!(task_id = %task.id, error = %e, "failed to persist task outcome");
            }

            ctx.event_bus.publish(EngineEvent::TaskCompleted {
                task_id: task.id,
                duration_ms: start.elapsed().as_millis() as u64,
            });
            tracing::info!(task_id = %task.id, attempt, "task completed");
        }
        Err(e) => {
            let error = e.to_string();
            let will_retry =
                classify(&error) == RetryClass::Retriable && attempt < ctx.config.max_attempts;

            ctx.event_bus.publish(EngineEvent::TaskFailed {
                task_id: task.id,
                error: error.clone(),
                will_retry,
            });

            if will_retry {
                let delay = backoff_delay(attempt, ctx.config.retry_base_delay, ctx.config.retry_max_delay);
                tracing::warn!(
                    task_id = %task.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = error.as_str(),
                    "task failed, retry scheduled"
                );
                ctx.event_bus.publish(EngineEvent::TaskRetryScheduled {
                    task_id: task.id,
                    attempt: attempt + 1,
                    delay_ms: delay.as_millis() as u64,
                });
                // The running-map registration stays in place; the retry
                // dispatcher replaces it when it pops this entry. The task is
                // never untracked between the failure and its retry, so a
                // concurrent poll cannot enqueue it on the primary queue.
                ctx.retry_queue
                    .push(task, 0, attempt + 1, Some(Instant::now() + delay));
            } else {
                ctx.running.remove(&task.id);
                tracing::error!(
                    task_id = %task.id,
                    attempt,
                    error = error.as_str(),
                    "task failed permanently"
                );
                let outcome = TaskOutcome::Failed {
                    error,
                    attempts: attempt,
                };
                if let Err(e) = ctx.sink.on_task_settled(&task, &outcome).await {
                    tracing::error!(task_id = %task.id, error = %e, "failed to persist task outcome");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
