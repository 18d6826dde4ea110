//! Per-task progress derived from logged study hours.
//!
//! Pure functions over tasks and progress logs: hours logged against each task
//! are summed, giving the remaining hours and a completion percentage.

use serde::Serialize;
use std::collections::HashMap;

use crate::types::{ProgressLog, Task, TaskStatus};

/// Derived progress for one task
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub logged_hours: f64,
    /// Rounded to one decimal
    pub remaining_hours: f64,
    pub progress_percent: u8,
}

/// A task annotated with its derived progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskWithProgress {
    #[serde(flatten)]
    pub task: Task,
    #[serde(flatten)]
    pub progress: Progress,
}

impl TaskWithProgress {
    /// A task stays on the to-do list until it is completed or fully progressed.
    pub fn is_active(&self) -> bool {
        self.task.status != TaskStatus::Completed && self.progress.progress_percent < 100
    }
}

/// Sum logged hours per task. Logs without a task are skipped.
pub fn logged_hours_by_task(logs: &[ProgressLog]) -> HashMap<&str, f64> {
    let mut logged: HashMap<&str, f64> = HashMap::new();
    for log in logs {
        if let Some(ref task_id) = log.task_id {
            *logged.entry(task_id.as_str()).or_default() += log.hours_studied;
        }
    }
    logged
}

/// Compute progress for a task given the hours logged against it.
///
/// An explicit, non-zero `progress_percentage` on the task wins; otherwise the
/// percentage is estimated as `logged / (logged + remaining)`.
pub fn compute_progress(task: &Task, logged_hours: f64) -> Progress {
    let remaining = (task.hours_required - logged_hours).max(0.0);

    let percent = match task.progress_percentage {
        Some(p) if p > 0 => f64::from(p),
        _ => {
            let total = logged_hours + remaining;
            if total > 0.0 {
                (logged_hours / total * 100.0).round()
            } else {
                0.0
            }
        }
    };

    Progress {
        logged_hours,
        remaining_hours: round_one_decimal(remaining),
        progress_percent: percent.clamp(0.0, 100.0) as u8,
    }
}

/// Annotate every task with its progress. Output order follows `tasks`.
pub fn annotate(tasks: &[Task], logs: &[ProgressLog]) -> Vec<TaskWithProgress> {
    let logged = logged_hours_by_task(logs);
    tasks
        .iter()
        .map(|task| {
            let hours = logged.get(task.id.as_str()).copied().unwrap_or(0.0);
            TaskWithProgress {
                task: task.clone(),
                progress: compute_progress(task, hours),
            }
        })
        .collect()
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
