//! Broadcast event bus for run, step, and task lifecycle events.
//!
//! Built on `tokio::sync::broadcast`, the `EventBus` supports multiple
//! concurrent subscribers. Publishing with no active subscribers is a no-op,
//! so the executor and scheduler emit unconditionally.

use stepflow_types::workflow::RunStatus;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lifecycle events emitted by the executor and the scheduler.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A workflow run started.
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        trigger_kind: String,
    },
    /// A step began executing.
    StepStarted {
        run_id: Uuid,
        step_id: String,
        step_name: String,
    },
    /// A step settled (succeeded or failed).
    StepSettled {
        run_id: Uuid,
        step_id: String,
        success: bool,
        duration_ms: u64,
    },
    /// A workflow run reached a terminal status.
    RunSettled {
        run_id: Uuid,
        status: RunStatus,
        error: Option<String>,
    },
    /// The scheduler started executing a task.
    TaskStarted { task_id: Uuid, attempt: u32 },
    /// A task completed successfully.
    TaskCompleted { task_id: Uuid, duration_ms: u64 },
    /// A task failed; `will_retry` is true when a retry was scheduled.
    TaskFailed {
        task_id: Uuid,
        error: String,
        will_retry: bool,
    },
    /// A retry was scheduled on the retry queue.
    TaskRetryScheduled {
        task_id: Uuid,
        attempt: u32,
        delay_ms: u64,
    },
    /// The scheduler finished its shutdown sequence.
    SchedulerStopped { drained: bool },
}

/// Multi-consumer event bus for engine lifecycle events.
///
/// Wraps a `tokio::sync::broadcast` channel. Cloning the bus clones the
/// sender, allowing multiple producers and consumers.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no subscribers, the event is silently dropped.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
