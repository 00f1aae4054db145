//! Per-session support state.
//!
//! Owned by exactly one `LiveSession` and mutated only by tool handlers
//! running on that session's event loop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tether_types::memory::UserId;
use tether_types::session::SessionId;

/// Default task label when no task is being tracked.
pub const GENERAL_TASK: &str = "general";

/// Furthest ahead a check-in may be scheduled.
pub const MAX_CHECKIN_MINUTES: f64 = 1440.0;

/// A task broken into micro-steps.
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub task: String,
    pub total_steps: u32,
    /// Steps completed so far.
    pub current_step: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedStep {
    pub task: String,
    pub step: u32,
    pub completed_at: DateTime<Utc>,
}

/// What happened when a step was marked complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAdvance {
    NoActiveTask,
    Advanced { step: u32, remaining: u32 },
    Finished { task: String, total: u32 },
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub current_task: Option<TaskProgress>,
    pub last_interaction: DateTime<Utc>,
    pub interaction_count: u32,
    /// When the most recently scheduled check-in is due.
    pub next_checkin_at: Option<DateTime<Utc>>,
    /// When that check-in was scheduled.
    pub last_checkin_at: Option<DateTime<Utc>>,
    pub completed_steps: Vec<CompletedStep>,
    pub wins: Vec<String>,
}

/// Snapshot handed back when a session closes.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub duration_minutes: f64,
    pub interaction_count: u32,
    pub steps_completed: usize,
    pub wins: usize,
}

impl SessionState {
    pub fn new(session_id: SessionId, user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            started_at: now,
            current_task: None,
            last_interaction: now,
            interaction_count: 0,
            next_checkin_at: None,
            last_checkin_at: None,
            completed_steps: Vec::new(),
            wins: Vec::new(),
        }
    }

    pub fn record_interaction(&mut self) {
        self.last_interaction = Utc::now();
        self.interaction_count += 1;
    }

    /// Start tracking a new task, replacing any current one.
    pub fn start_task(&mut self, task: impl Into<String>, steps: u32) {
        self.current_task = Some(TaskProgress {
            task: task.into(),
            total_steps: steps.max(1),
            current_step: 0,
            started_at: Utc::now(),
        });
    }

    /// Advance the current task by one step. Clears the task when finished.
    pub fn complete_step(&mut self) -> StepAdvance {
        let Some(progress) = self.current_task.as_mut() else {
            return StepAdvance::NoActiveTask;
        };
        self.completed_steps.push(CompletedStep {
            task: progress.task.clone(),
            step: progress.current_step,
            completed_at: Utc::now(),
        });
        progress.current_step += 1;
        if progress.current_step >= progress.total_steps {
            let total = progress.total_steps;
            let task = self
                .current_task
                .take()
                .map(|p| p.task)
                .unwrap_or_default();
            StepAdvance::Finished { task, total }
        } else {
            StepAdvance::Advanced {
                step: progress.current_step,
                remaining: progress.total_steps - progress.current_step,
            }
        }
    }

    /// Label of the tracked task, if any.
    pub fn task_label(&self) -> Option<&str> {
        self.current_task.as_ref().map(|t| t.task.as_str())
    }

    /// Schedule the next check-in `minutes` from now.
    ///
    /// Returns `None`, leaving the schedule untouched, when `minutes` is
    /// outside `0..=MAX_CHECKIN_MINUTES`.
    pub fn schedule_checkin(&mut self, minutes: f64) -> Option<DateTime<Utc>> {
        if !(0.0..=MAX_CHECKIN_MINUTES).contains(&minutes) {
            return None;
        }
        let now = Utc::now();
        let delay = chrono::TimeDelta::try_milliseconds((minutes * 60_000.0) as i64)?;
        let at = now.checked_add_signed(delay)?;
        self.next_checkin_at = Some(at);
        self.last_checkin_at = Some(now);
        Some(at)
    }

    /// Minutes elapsed since the last check-in was scheduled.
    pub fn minutes_since_checkin(&self) -> Option<f64> {
        self.last_checkin_at
            .map(|at| (Utc::now() - at).num_milliseconds() as f64 / 60_000.0)
    }

    pub fn log_win(&mut self, description: impl Into<String>) {
        self.wins.push(description.into());
    }

    pub fn summary(&self) -> SessionSummary {
        let duration = Utc::now() - self.started_at;
        SessionSummary {
            session_id: self.session_id,
            duration_minutes: duration.num_milliseconds() as f64 / 60_000.0,
            interaction_count: self.interaction_count,
            steps_completed: self.completed_steps.len(),
            wins: self.wins.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn state() -> SessionState {
        SessionState::new(Uuid::now_v7(), UserId::parse("u1").unwrap())
    }

    #[test]
    fn test_checkin_out_of_range_leaves_schedule_untouched() {
        let mut s = state();
        assert!(s.schedule_checkin(1e12).is_none());
        assert!(s.schedule_checkin(-1e12).is_none());
        assert!(s.schedule_checkin(-0.5).is_none());
        assert!(s.next_checkin_at.is_none());
        assert!(s.last_checkin_at.is_none());

        let at = s.schedule_checkin(MAX_CHECKIN_MINUTES).unwrap();
        assert_eq!(s.next_checkin_at, Some(at));
    }

    #[test]
    fn test_step_progression_clears_finished_task() {
        let mut s = state();
        assert_eq!(s.complete_step(), StepAdvance::NoActiveTask);

        s.start_task("laundry", 2);
        assert_eq!(s.task_label(), Some("laundry"));
        assert_eq!(
            s.complete_step(),
            StepAdvance::Advanced {
                step: 1,
                remaining: 1
            }
        );
        assert_eq!(
            s.complete_step(),
            StepAdvance::Finished {
                task: "laundry".to_string(),
                total: 2
            }
        );
        assert!(s.task_label().is_none());
        assert_eq!(s.completed_steps.len(), 2);
    }

    #[test]
    fn test_zero_steps_treated_as_one() {
        let mut s = state();
        s.start_task("email", 0);
        assert!(matches!(s.complete_step(), StepAdvance::Finished { total: 1, .. }));
    }

    #[test]
    fn test_summary_counts() {
        let mut s = state();
        s.record_interaction();
        s.record_interaction();
        s.log_win("replied to Sam");
        let summary = s.summary();
        assert_eq!(summary.interaction_count, 2);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.steps_completed, 0);
    }
}
