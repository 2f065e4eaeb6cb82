//! Task priority computation for the primary queue.
//!
//! Priority is a plain score; higher runs first. Inputs:
//! - staleness: minutes past `next_run`, capped so one ancient task can't
//!   starve everything behind it forever
//! - a bonus for one-time tasks (a user is usually waiting on those)
//! - a penalty for tasks whose previous execution failed; retries have their
//!   own queue, so the primary queue favors never-failed work
//!
//! Dequeue order among equal scores is FIFO via a monotonic sequence number
//! assigned at enqueue time.

use chrono::{DateTime, Utc};
use stepflow_types::task::Task;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Staleness contribution ceiling, in minutes (24 hours).
pub const STALENESS_CAP_MINUTES: i64 = 24 * 60;

/// Score bonus for one-time tasks.
pub const ONE_TIME_BONUS: i64 = 100;

/// Score penalty for tasks whose last execution failed.
pub const FAILED_PENALTY: i64 = 50;

// ---------------------------------------------------------------------------
// task_priority
// ---------------------------------------------------------------------------

/// Compute a task's dispatch priority at `now`. Higher runs first.
pub fn task_priority(task: &Task, now: DateTime<Utc>) -> i64 {
    let staleness_minutes = (now - task.next_run).num_minutes().max(0);
    let mut score = staleness_minutes.min(STALENESS_CAP_MINUTES);

    if task.do_only_once {
        score += ONE_TIME_BONUS;
    }
    if task.last_failed {
        score -= FAILED_PENALTY;
    }

    score
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stepflow_types::task::TaskKind;
    use uuid::Uuid;

    fn task_due(minutes_ago: i64) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::now_v7(),
            name: "t".to_string(),
            kind: TaskKind::Prompt {
                prompt: "p".to_string(),
            },
            schedule: None,
            next_run: now - Duration::minutes(minutes_ago),
            do_only_once: false,
            retry_count: 0,
            last_failed: false,
            created_at: now - Duration::hours(1),
            enabled: true,
            created_by: "u".to_string(),
        }
    }

    #[test]
    fn staler_tasks_score_higher() {
        let now = Utc::now();
        let fresh = task_due(1);
        let stale = task_due(45);
        assert!(task_priority(&stale, now) > task_priority(&fresh, now));
    }

    #[test]
    fn staleness_is_capped_at_24h() {
        let now = Utc::now();
        let old = task_due(STALENESS_CAP_MINUTES + 500);
        let older = task_due(STALENESS_CAP_MINUTES + 5000);
        assert_eq!(task_priority(&old, now), STALENESS_CAP_MINUTES);
        assert_eq!(task_priority(&old, now), task_priority(&older, now));
    }

    #[test]
    fn future_tasks_have_no_negative_staleness() {
        let now = Utc::now();
        let mut future = task_due(0);
        future.next_run = now + Duration::minutes(30);
        assert_eq!(task_priority(&future, now), 0);
    }

    #[test]
    fn one_time_tasks_get_a_bonus() {
        let now = Utc::now();
        let recurring = task_due(10);
        let mut one_time = task_due(10);
        one_time.do_only_once = true;
        assert_eq!(
            task_priority(&one_time, now),
            task_priority(&recurring, now) + ONE_TIME_BONUS
        );
    }

    #[test]
    fn previously_failed_tasks_are_deprioritized() {
        let now = Utc::now();
        let clean = task_due(10);
        let mut failed = task_due(10);
        failed.last_failed = true;
        assert_eq!(
            task_priority(&failed, now),
            task_priority(&clean, now) - FAILED_PENALTY
        );
    }

    #[test]
    fn fresh_one_time_beats_stale_recurring_within_bonus() {
        let now = Utc::now();
        let mut one_time = task_due(0);
        one_time.do_only_once = true;
        let stale = task_due(60);
        assert!(task_priority(&one_time, now) > task_priority(&stale, now));
    }
}
