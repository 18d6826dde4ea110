//! Dashboard view: counters, the to-do list, tasks due soon and today's plans.

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{self, LogFilter, TaskFilter};
use crate::planner::day_of_week;
use crate::progress::{annotate, TaskWithProgress};
use crate::types::{ProgressLog, StudyPlan, Task};

/// Entries shown in each dashboard list
const LIST_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_subjects: usize,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    /// Visible tasks due within the next 7 days
    pub upcoming_tasks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub todo: Vec<TaskWithProgress>,
    pub due_soon: Vec<TaskWithProgress>,
    pub today_plans: Vec<StudyPlan>,
}

/// Not completed and due at or after `now`. Undated tasks are not visible.
pub fn is_visible(task: &Task, now: DateTime<Utc>) -> bool {
    !task.is_completed() && task.due_date.is_some_and(|due| due >= now)
}

fn due_within(task: &Task, now: DateTime<Utc>, window: Duration) -> bool {
    task.due_date.is_some_and(|due| due <= now + window)
}

/// Assemble the dashboard from already loaded rows.
///
/// `tasks` is every task of the account, sorted by due date; `logs` must cover
/// at least the visible tasks.
pub fn build(
    total_subjects: usize,
    tasks: &[Task],
    logs: &[ProgressLog],
    today_plans: Vec<StudyPlan>,
    now: DateTime<Utc>,
) -> Dashboard {
    let visible: Vec<Task> = tasks
        .iter()
        .filter(|t| is_visible(t, now))
        .cloned()
        .collect();

    let stats = DashboardStats {
        total_subjects,
        total_tasks: tasks.len(),
        completed_tasks: tasks.iter().filter(|t| t.is_completed()).count(),
        upcoming_tasks: visible
            .iter()
            .filter(|t| due_within(t, now, Duration::days(7)))
            .count(),
    };

    let active: Vec<TaskWithProgress> = annotate(&visible, logs)
        .into_iter()
        .filter(TaskWithProgress::is_active)
        .collect();

    let due_soon = active
        .iter()
        .filter(|t| due_within(&t.task, now, Duration::hours(24)))
        .take(LIST_LIMIT)
        .cloned()
        .collect();
    let todo = active.into_iter().take(LIST_LIMIT).collect();

    Dashboard {
        stats,
        todo,
        due_soon,
        today_plans,
    }
}

/// Load the account's dashboard at `now`. Today's weekday is read in `offset`.
pub fn load(
    conn: &Connection,
    user_id: &str,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Dashboard> {
    let total_subjects = db::count_subjects(conn, user_id)?;
    let tasks = db::list_tasks(conn, user_id, &TaskFilter::default())?;

    let visible_ids: Vec<String> = tasks
        .iter()
        .filter(|t| is_visible(t, now))
        .map(|t| t.id.clone())
        .collect();
    let logs = db::list_logs(
        conn,
        user_id,
        &LogFilter {
            task_ids: Some(visible_ids),
            ..Default::default()
        },
    )?;

    let today = day_of_week(now.with_timezone(&offset).date_naive());
    let today_plans = db::list_plans(conn, user_id, Some(today))?;

    Ok(build(total_subjects, &tasks, &logs, today_plans, now))
}
