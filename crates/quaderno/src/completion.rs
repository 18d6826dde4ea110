//! Logging study time against a task and advancing its status.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use tracing::info;

use crate::db::{self, LogFilter};
use crate::error::AppError;
use crate::types::{
    validate_hours_studied, validate_percentage, NewProgressLog, Task, TaskStatus, TaskUpdate,
};

/// Body of a "log task progress" submission
#[derive(Debug, Clone, Deserialize)]
pub struct TaskProgressEntry {
    pub hours_studied: f64,
    pub progress: u8,
}

impl TaskProgressEntry {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_hours_studied(self.hours_studied)?;
        validate_percentage(self.progress)
    }
}

/// Status after recording progress: completed at 100% or with nothing left
/// to do, otherwise a pending task starts counting as in progress.
pub fn next_status(current: TaskStatus, progress: u8, remaining_hours: f64) -> TaskStatus {
    if progress >= 100 || remaining_hours <= 0.0 {
        TaskStatus::Completed
    } else if current == TaskStatus::Pending {
        TaskStatus::InProgress
    } else {
        current
    }
}

/// Append a progress log dated `today` for the task, store the reported
/// percentage and move the task along. Returns the updated task.
///
/// The log insert and the task update are separate writes.
pub fn log_task_progress(
    conn: &Connection,
    user_id: &str,
    task_id: &str,
    entry: &TaskProgressEntry,
    today: NaiveDate,
) -> Result<Task, AppError> {
    entry.validate()?;

    let task = db::get_task(conn, user_id, task_id)?.ok_or(AppError::NotFound("Task"))?;

    db::insert_log(
        conn,
        user_id,
        &NewProgressLog {
            subject_id: task.subject_id.clone(),
            task_id: Some(task.id.clone()),
            date: today,
            hours_studied: entry.hours_studied,
            notes: Some(format!("Completed: {}", task.title)),
        },
    )?;

    let logs = db::list_logs(
        conn,
        user_id,
        &LogFilter {
            task_ids: Some(vec![task.id.clone()]),
            ..Default::default()
        },
    )?;
    let logged: f64 = logs.iter().map(|l| l.hours_studied).sum();
    // Unrounded, so a sliver of remaining work keeps the task open
    let remaining = (task.hours_required - logged).max(0.0);
    let status = next_status(task.status, entry.progress, remaining);

    let updates = TaskUpdate {
        progress_percentage: Some(entry.progress),
        status: (status != task.status).then_some(status),
        ..Default::default()
    };
    db::update_task(conn, user_id, task_id, &updates)?;

    info!(
        task = %task.id,
        hours = entry.hours_studied,
        progress = entry.progress,
        status = %status,
        "Logged task progress"
    );

    db::get_task(conn, user_id, task_id)?.ok_or(AppError::NotFound("Task"))
}
