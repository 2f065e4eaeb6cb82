//! In-memory priority work queue.
//!
//! `WorkQueue` is a binary heap of `QueueEntry` ordered by priority
//! (higher first), FIFO among equal priorities via a monotonic sequence
//! number. It lives only in memory: the host's task store is the source of
//! truth, and a restart simply repopulates the queue on the next poll.
//!
//! A `Notify` wakes the queue's dispatcher on push and resume. Each queue
//! has a single consumer.

use std::collections::BinaryHeap;
use std::sync::Mutex;

use stepflow_types::task::Task;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// QueueEntry
// ---------------------------------------------------------------------------

/// A task waiting in a queue, with its dispatch metadata.
#[derive(Debug)]
pub struct QueueEntry {
    pub task: Task,
    /// Computed priority; higher dequeues first.
    pub priority: i64,
    /// Enqueue sequence number; FIFO tiebreak among equal priorities.
    seq: u64,
    /// 1-based attempt number this dispatch represents.
    pub attempt: u32,
    /// Earliest instant this entry may run (backoff on the retry queue).
    pub not_before: Option<Instant>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority wins, then the lower sequence number.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

// ---------------------------------------------------------------------------
// WorkQueue
// ---------------------------------------------------------------------------

struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
    paused: bool,
}

/// Priority queue with pause/resume and dispatcher wakeup.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                paused: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue a task and wake the dispatcher.
    pub fn push(&self, task: Task, priority: i64, attempt: u32, not_before: Option<Instant>) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(QueueEntry {
                task,
                priority,
                seq,
                attempt,
                not_before,
            });
        }
        self.notify.notify_one();
    }

    /// Pop the highest-priority entry, or `None` when paused or empty.
    pub fn pop(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.paused {
            return None;
        }
        state.heap.pop()
    }

    /// Wait until an entry can be popped.
    ///
    /// Single-consumer: the queue's dispatcher is the only caller.
    pub async fn next(&self) -> QueueEntry {
        loop {
            if let Some(entry) = self.pop() {
                return entry;
            }
            self.notify.notified().await;
        }
    }

    /// Stop handing out entries (they stay queued).
    pub fn pause(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).paused = true;
    }

    /// Resume handing out entries and wake the dispatcher.
    pub fn resume(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).paused = false;
        self.notify.notify_one();
    }

    /// Drop all queued entries, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = state.heap.len();
        state.heap.clear();
        dropped
    }

    /// Whether a task is already waiting in this queue.
    pub fn contains(&self, task_id: Uuid) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .heap
            .iter()
            .any(|e| e.task.id == task_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
