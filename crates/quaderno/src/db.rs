//! Database operations module for SQLite storage
//!
//! This module handles all database operations including:
//! - Database initialization and migrations
//! - CRUD operations for profiles, subjects, tasks, study plans,
//!   progress logs and reminders
//! - The admin audit trail (`system_logs`)
//! - Per-account row scoping: every query filters on the owner's `user_id`,
//!   except the admin queries which read across accounts

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::planner::Slot;
use crate::reminders::ReminderStore;
use crate::types::{
    LogType, NewProgressLog, NewReminder, NewStudyPlan, NewSubject, NewTask, NotificationType,
    Priority, Profile, ProgressLog, Recurrence, Reminder, ReminderStatus, ReminderUpdate, Role,
    StudyPlan, Subject, SubjectUpdate, SystemLog, Task, TaskStatus, TaskType, TaskUpdate,
};

/// Stored as their snake_case string form
macro_rules! sql_text_enum {
    ($($ty:ident),+ $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                $ty::parse(s).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} value: {s}", stringify!($ty)).into())
                })
            }
        }
    )+};
}

sql_text_enum!(
    Role,
    TaskType,
    Priority,
    TaskStatus,
    Recurrence,
    NotificationType,
    ReminderStatus,
    LogType,
);

const DEFAULT_SUBJECT_COLOR: &str = "#3B82F6";

/// Initialize the database at the given path, running any pending migrations
pub fn init_db(db_path: &Path, migrations_dir: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    // Enable foreign keys
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let count = run_migrations(&conn, migrations_dir)?;
    if count > 0 {
        info!(count = count, "Applied migrations");
    }

    Ok(conn)
}

/// Run pending migrations from the migrations directory.
/// The first migration creates `schema_migrations` itself.
pub fn run_migrations(conn: &Connection, migrations_dir: &Path) -> Result<usize> {
    let mut migrations: Vec<_> = std::fs::read_dir(migrations_dir)
        .with_context(|| {
            format!(
                "Failed to read migrations directory: {}",
                migrations_dir.display()
            )
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "sql").unwrap_or(false))
        .collect();

    migrations.sort();

    let mut applied = 0;

    for migration_path in migrations {
        let version = migration_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid migration filename"))?
            .to_string();

        // Fails before the first migration has created the table
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [&version],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if already_applied {
            continue;
        }

        let sql = std::fs::read_to_string(&migration_path)
            .with_context(|| format!("Failed to read migration: {}", migration_path.display()))?;

        conn.execute_batch(&sql)
            .with_context(|| format!("Failed to apply migration: {}", version))?;

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            [&version],
        )?;

        debug!(version = %version, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// `?, ?, ?` for an IN list
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Run a dynamic `UPDATE ... SET` built from optional fields.
/// Returns false when nothing matched or there was nothing to set.
fn apply_update(
    conn: &Connection,
    table: &str,
    mut set_clauses: Vec<&str>,
    mut params_vec: Vec<Box<dyn ToSql>>,
    user_id: &str,
    id: &str,
) -> Result<bool> {
    if set_clauses.is_empty() {
        return Ok(false);
    }
    if table == "profiles" {
        set_clauses.push("updated_at = ?");
        params_vec.push(Box::new(Utc::now()));
    }

    let sql = if table == "profiles" {
        params_vec.push(Box::new(id.to_string()));
        format!("UPDATE {table} SET {} WHERE id = ?", set_clauses.join(", "))
    } else {
        params_vec.push(Box::new(id.to_string()));
        params_vec.push(Box::new(user_id.to_string()));
        format!(
            "UPDATE {table} SET {} WHERE id = ? AND user_id = ?",
            set_clauses.join(", ")
        )
    };

    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let affected = conn.execute(&sql, params_refs.as_slice())?;
    Ok(affected > 0)
}

// ========== Profiles ==========

const PROFILE_COLUMNS: &str =
    "id, full_name, email, role, reminder_time, semester_length_weeks, created_at, updated_at";

fn profile_from_row(row: &Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        reminder_time: row.get(4)?,
        semester_length_weeks: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Get the account's profile, creating a student profile on first sight
pub fn ensure_profile(conn: &Connection, user_id: &str, email: Option<&str>) -> Result<Profile> {
    let now = Utc::now();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO profiles (id, email, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![user_id, email, Role::Student, now],
    )?;
    if inserted > 0 {
        info!(user = %user_id, "Created profile");
        insert_system_log(conn, Some(user_id), LogType::Success, "New account registered")?;
    }
    get_profile(conn, user_id)?.context("Profile missing right after insert")
}

pub fn get_profile(conn: &Connection, user_id: &str) -> Result<Option<Profile>> {
    let profile = conn
        .query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
            [user_id],
            profile_from_row,
        )
        .optional()?;
    Ok(profile)
}

/// Validated profile changes
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub reminder_time: Option<NaiveTime>,
    pub semester_length_weeks: Option<u32>,
}

pub fn update_profile(conn: &Connection, user_id: &str, changes: &ProfileChanges) -> Result<bool> {
    let mut set_clauses = Vec::new();
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref name) = changes.full_name {
        set_clauses.push("full_name = ?");
        params_vec.push(Box::new(name.clone()));
    }
    if let Some(time) = changes.reminder_time {
        set_clauses.push("reminder_time = ?");
        params_vec.push(Box::new(time));
    }
    if let Some(weeks) = changes.semester_length_weeks {
        set_clauses.push("semester_length_weeks = ?");
        params_vec.push(Box::new(weeks));
    }

    apply_update(conn, "profiles", set_clauses, params_vec, user_id, user_id)
}

/// All profiles, newest first (admin)
pub fn list_profiles(conn: &Connection) -> Result<Vec<Profile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at DESC"
    ))?;
    let profiles = stmt
        .query_map([], profile_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(profiles)
}

/// Change any account's role (admin)
pub fn set_role(conn: &Connection, user_id: &str, role: Role) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE profiles SET role = ?1, updated_at = ?2 WHERE id = ?3",
        params![role, Utc::now(), user_id],
    )?;
    Ok(affected > 0)
}

/// Row counts across all accounts (admin)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SystemCounts {
    pub total_users: usize,
    pub total_subjects: usize,
    pub total_tasks: usize,
    /// Profiles updated since the given instant
    pub active_users: usize,
}

pub fn system_counts(conn: &Connection, active_since: DateTime<Utc>) -> Result<SystemCounts> {
    let count = |sql: &str| -> Result<usize> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    };
    let active: i64 = conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE updated_at > ?1",
        params![active_since],
        |row| row.get(0),
    )?;

    Ok(SystemCounts {
        total_users: count("SELECT COUNT(*) FROM profiles")?,
        total_subjects: count("SELECT COUNT(*) FROM subjects")?,
        total_tasks: count("SELECT COUNT(*) FROM tasks")?,
        active_users: active as usize,
    })
}

// ========== System logs ==========

/// Append an audit entry
pub fn insert_system_log(
    conn: &Connection,
    user_id: Option<&str>,
    log_type: LogType,
    message: &str,
) -> Result<SystemLog> {
    let log = SystemLog {
        id: new_id(),
        user_id: user_id.map(str::to_string),
        log_type,
        message: message.to_string(),
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO system_logs (id, user_id, log_type, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![log.id, log.user_id, log.log_type, log.message, log.created_at],
    )?;
    Ok(log)
}

/// Newest audit entries first, across all accounts (admin)
pub fn recent_system_logs(conn: &Connection, limit: usize) -> Result<Vec<SystemLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, log_type, message, created_at FROM system_logs
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?1",
    )?;
    let logs = stmt
        .query_map([limit as i64], |row| {
            Ok(SystemLog {
                id: row.get(0)?,
                user_id: row.get(1)?,
                log_type: row.get(2)?,
                message: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}

// ========== Subjects ==========

const SUBJECT_COLUMNS: &str = "id, user_id, name, instructor, credits, semester, color, created_at";

fn subject_from_row(row: &Row) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        instructor: row.get(3)?,
        credits: row.get(4)?,
        semester: row.get(5)?,
        color: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Subjects sorted by name
pub fn list_subjects(conn: &Connection, user_id: &str) -> Result<Vec<Subject>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE user_id = ?1 ORDER BY name ASC"
    ))?;
    let subjects = stmt
        .query_map([user_id], subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(subjects)
}

pub fn get_subject(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Subject>> {
    let subject = conn
        .query_row(
            &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = ?1 AND user_id = ?2"),
            [id, user_id],
            subject_from_row,
        )
        .optional()?;
    Ok(subject)
}

pub fn insert_subject(conn: &Connection, user_id: &str, new: &NewSubject) -> Result<Subject> {
    let subject = Subject {
        id: new_id(),
        user_id: user_id.to_string(),
        name: new.name.trim().to_string(),
        instructor: new.instructor.clone(),
        credits: new.credits,
        semester: new.semester.clone(),
        color: new
            .color
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBJECT_COLOR.to_string()),
        created_at: Utc::now(),
    };

    conn.execute(
        &format!("INSERT INTO subjects ({SUBJECT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            subject.id,
            subject.user_id,
            subject.name,
            subject.instructor,
            subject.credits,
            subject.semester,
            subject.color,
            subject.created_at,
        ],
    )?;
    Ok(subject)
}

pub fn update_subject(
    conn: &Connection,
    user_id: &str,
    id: &str,
    updates: &SubjectUpdate,
) -> Result<bool> {
    let mut set_clauses = Vec::new();
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref name) = updates.name {
        set_clauses.push("name = ?");
        params_vec.push(Box::new(name.trim().to_string()));
    }
    if let Some(ref instructor) = updates.instructor {
        set_clauses.push("instructor = ?");
        params_vec.push(Box::new(instructor.clone()));
    }
    if let Some(credits) = updates.credits {
        set_clauses.push("credits = ?");
        params_vec.push(Box::new(credits));
    }
    if let Some(ref semester) = updates.semester {
        set_clauses.push("semester = ?");
        params_vec.push(Box::new(semester.clone()));
    }
    if let Some(ref color) = updates.color {
        set_clauses.push("color = ?");
        params_vec.push(Box::new(color.clone()));
    }

    apply_update(conn, "subjects", set_clauses, params_vec, user_id, id)
}

/// Delete a subject; its tasks, plans and logs go with it
pub fn delete_subject(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM subjects WHERE id = ?1 AND user_id = ?2",
        [id, user_id],
    )?;
    Ok(affected > 0)
}

pub fn count_subjects(conn: &Connection, user_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subjects WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

// ========== Tasks ==========

const TASK_COLUMNS: &str = "id, user_id, subject_id, title, description, task_type, due_date, \
     priority, hours_required, progress_percentage, status, completed_at, created_at";

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        task_type: row.get(5)?,
        due_date: row.get(6)?,
        priority: row.get(7)?,
        hours_required: row.get(8)?,
        progress_percentage: row.get(9)?,
        status: row.get(10)?,
        completed_at: row.get(11)?,
        created_at: row.get(12)?,
    })
}

/// Filters for listing tasks; all optional
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub exclude_completed: bool,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub due_from: Option<DateTime<Utc>>,
    pub created_from: Option<DateTime<Utc>>,
}

/// Tasks ordered by due date, undated last
pub fn list_tasks(conn: &Connection, user_id: &str, filter: &TaskFilter) -> Result<Vec<Task>> {
    let mut where_clauses = vec!["user_id = ?"];
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(user_id.to_string())];

    if filter.exclude_completed {
        where_clauses.push("status != ?");
        params_vec.push(Box::new(TaskStatus::Completed));
    }
    if let Some(status) = filter.status {
        where_clauses.push("status = ?");
        params_vec.push(Box::new(status));
    }
    if let Some(priority) = filter.priority {
        where_clauses.push("priority = ?");
        params_vec.push(Box::new(priority));
    }
    if let Some(due_from) = filter.due_from {
        where_clauses.push("due_date >= ?");
        params_vec.push(Box::new(due_from));
    }
    if let Some(created_from) = filter.created_from {
        where_clauses.push("created_at >= ?");
        params_vec.push(Box::new(created_from));
    }

    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE {} ORDER BY due_date IS NULL, due_date ASC",
        where_clauses.join(" AND ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let tasks = stmt
        .query_map(params_refs.as_slice(), task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

pub fn get_task(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
            [id, user_id],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

pub fn insert_task(conn: &Connection, user_id: &str, new: &NewTask) -> Result<Task> {
    let now = Utc::now();
    let task = Task {
        id: new_id(),
        user_id: user_id.to_string(),
        subject_id: new.subject_id.clone(),
        title: new.title.trim().to_string(),
        description: new.description.clone(),
        task_type: new.task_type,
        due_date: new.due_date,
        priority: new.priority,
        hours_required: new.hours_required,
        progress_percentage: new.progress_percentage,
        status: new.status,
        completed_at: (new.status == TaskStatus::Completed).then_some(now),
        created_at: now,
    };

    conn.execute(
        &format!(
            "INSERT INTO tasks ({TASK_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            task.id,
            task.user_id,
            task.subject_id,
            task.title,
            task.description,
            task.task_type,
            task.due_date,
            task.priority,
            task.hours_required,
            task.progress_percentage,
            task.status,
            task.completed_at,
            task.created_at,
        ],
    )?;
    Ok(task)
}

/// Update an existing task. Moving to `completed` stamps `completed_at`.
pub fn update_task(conn: &Connection, user_id: &str, id: &str, updates: &TaskUpdate) -> Result<bool> {
    let mut set_clauses = Vec::new();
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref subject_id) = updates.subject_id {
        set_clauses.push("subject_id = ?");
        params_vec.push(Box::new(subject_id.clone()));
    }
    if let Some(ref title) = updates.title {
        set_clauses.push("title = ?");
        params_vec.push(Box::new(title.trim().to_string()));
    }
    if let Some(ref description) = updates.description {
        set_clauses.push("description = ?");
        params_vec.push(Box::new(description.clone()));
    }
    if let Some(task_type) = updates.task_type {
        set_clauses.push("task_type = ?");
        params_vec.push(Box::new(task_type));
    }
    if let Some(due_date) = updates.due_date {
        set_clauses.push("due_date = ?");
        params_vec.push(Box::new(due_date));
    }
    if let Some(priority) = updates.priority {
        set_clauses.push("priority = ?");
        params_vec.push(Box::new(priority));
    }
    if let Some(hours) = updates.hours_required {
        set_clauses.push("hours_required = ?");
        params_vec.push(Box::new(hours));
    }
    if let Some(progress) = updates.progress_percentage {
        set_clauses.push("progress_percentage = ?");
        params_vec.push(Box::new(progress));
    }
    if let Some(status) = updates.status {
        set_clauses.push("status = ?");
        params_vec.push(Box::new(status));
        set_clauses.push("completed_at = ?");
        params_vec.push(Box::new(
            (status == TaskStatus::Completed).then(Utc::now),
        ));
    }

    apply_update(conn, "tasks", set_clauses, params_vec, user_id, id)
}

/// Manual status change, allowed from any state
pub fn set_task_status(conn: &Connection, user_id: &str, id: &str, status: TaskStatus) -> Result<bool> {
    let updates = TaskUpdate {
        status: Some(status),
        ..Default::default()
    };
    update_task(conn, user_id, id, &updates)
}

/// Delete a task; its reminders go with it, logs and plans are detached
pub fn delete_task(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
        [id, user_id],
    )?;
    Ok(affected > 0)
}

// ========== Progress logs ==========

const LOG_COLUMNS: &str = "id, user_id, subject_id, task_id, date, hours_studied, notes, created_at";

fn log_from_row(row: &Row) -> rusqlite::Result<ProgressLog> {
    Ok(ProgressLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject_id: row.get(2)?,
        task_id: row.get(3)?,
        date: row.get(4)?,
        hours_studied: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[derive(Debug, Default, Clone)]
pub struct LogFilter {
    /// Only logs against one of these tasks
    pub task_ids: Option<Vec<String>>,
    pub date_from: Option<NaiveDate>,
}

/// Progress logs, newest date first
pub fn list_logs(conn: &Connection, user_id: &str, filter: &LogFilter) -> Result<Vec<ProgressLog>> {
    let mut where_clauses = vec!["user_id = ?".to_string()];
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(user_id.to_string())];

    if let Some(ref task_ids) = filter.task_ids {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        where_clauses.push(format!("task_id IN ({})", placeholders(task_ids.len())));
        for id in task_ids {
            params_vec.push(Box::new(id.clone()));
        }
    }
    if let Some(date_from) = filter.date_from {
        where_clauses.push("date >= ?".to_string());
        params_vec.push(Box::new(date_from));
    }

    let sql = format!(
        "SELECT {LOG_COLUMNS} FROM progress_logs WHERE {} ORDER BY date DESC, created_at DESC",
        where_clauses.join(" AND ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let logs = stmt
        .query_map(params_from_iter(params_vec.iter()), log_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}

pub fn insert_log(conn: &Connection, user_id: &str, new: &NewProgressLog) -> Result<ProgressLog> {
    let log = ProgressLog {
        id: new_id(),
        user_id: user_id.to_string(),
        subject_id: new.subject_id.clone(),
        task_id: new.task_id.clone(),
        date: new.date,
        hours_studied: new.hours_studied,
        notes: new.notes.clone(),
        created_at: Utc::now(),
    };

    conn.execute(
        &format!("INSERT INTO progress_logs ({LOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            log.id,
            log.user_id,
            log.subject_id,
            log.task_id,
            log.date,
            log.hours_studied,
            log.notes,
            log.created_at,
        ],
    )?;
    Ok(log)
}

pub fn delete_log(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM progress_logs WHERE id = ?1 AND user_id = ?2",
        [id, user_id],
    )?;
    Ok(affected > 0)
}

// ========== Study plans ==========

const PLAN_COLUMNS: &str = "id, user_id, subject_id, task_id, day_of_week, start_time, end_time, \
     recurrence, location, notes, created_at";

fn plan_from_row(row: &Row) -> rusqlite::Result<StudyPlan> {
    Ok(StudyPlan {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject_id: row.get(2)?,
        task_id: row.get(3)?,
        day_of_week: row.get(4)?,
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        recurrence: row.get(7)?,
        location: row.get(8)?,
        notes: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Plans ordered by day and start time, optionally for one day only
pub fn list_plans(conn: &Connection, user_id: &str, day_of_week: Option<u8>) -> Result<Vec<StudyPlan>> {
    let plans = match day_of_week {
        Some(day) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PLAN_COLUMNS} FROM study_plans
                 WHERE user_id = ?1 AND day_of_week = ?2
                 ORDER BY start_time ASC"
            ))?;
            let rows = stmt.query_map(params![user_id, day], plan_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PLAN_COLUMNS} FROM study_plans
                 WHERE user_id = ?1
                 ORDER BY day_of_week ASC, start_time ASC"
            ))?;
            let rows = stmt.query_map([user_id], plan_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(plans)
}

/// Insert a plan whose slot has already been checked by the planner
pub fn insert_plan(conn: &Connection, user_id: &str, new: &NewStudyPlan, slot: Slot) -> Result<StudyPlan> {
    let plan = StudyPlan {
        id: new_id(),
        user_id: user_id.to_string(),
        subject_id: new.subject_id.clone(),
        task_id: new.task_id.clone(),
        day_of_week: slot.day_of_week,
        start_time: slot.start,
        end_time: slot.end,
        recurrence: new.recurrence,
        location: new.location.clone(),
        notes: new.notes.clone(),
        created_at: Utc::now(),
    };

    conn.execute(
        &format!(
            "INSERT INTO study_plans ({PLAN_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            plan.id,
            plan.user_id,
            plan.subject_id,
            plan.task_id,
            plan.day_of_week,
            plan.start_time,
            plan.end_time,
            plan.recurrence,
            plan.location,
            plan.notes,
            plan.created_at,
        ],
    )?;
    Ok(plan)
}

pub fn delete_plan(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM study_plans WHERE id = ?1 AND user_id = ?2",
        [id, user_id],
    )?;
    Ok(affected > 0)
}

// ========== Reminders ==========

const REMINDER_COLUMNS: &str =
    "id, user_id, task_id, remind_at, message, notification_type, status, sent_at, created_at";

fn reminder_from_row(row: &Row) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task_id: row.get(2)?,
        remind_at: row.get(3)?,
        message: row.get(4)?,
        notification_type: row.get(5)?,
        status: row.get(6)?,
        sent_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Reminders ordered by `remind_at`, then insertion
pub fn list_reminders(conn: &Connection, user_id: &str) -> Result<Vec<Reminder>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REMINDER_COLUMNS} FROM reminders
         WHERE user_id = ?1
         ORDER BY remind_at ASC, created_at ASC, rowid ASC"
    ))?;
    let reminders = stmt
        .query_map([user_id], reminder_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reminders)
}

pub fn get_reminder(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Reminder>> {
    let reminder = conn
        .query_row(
            &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1 AND user_id = ?2"),
            [id, user_id],
            reminder_from_row,
        )
        .optional()?;
    Ok(reminder)
}

/// Insert reminders in one transaction and return the stored rows
pub fn insert_reminders(conn: &Connection, user_id: &str, new: &[NewReminder]) -> Result<Vec<Reminder>> {
    let tx = conn.unchecked_transaction()?;
    let mut inserted = Vec::with_capacity(new.len());

    for r in new {
        let reminder = Reminder {
            id: new_id(),
            user_id: user_id.to_string(),
            task_id: r.task_id.clone(),
            remind_at: r.remind_at,
            message: r.message.clone(),
            notification_type: r.notification_type,
            status: r.status,
            sent_at: None,
            created_at: Utc::now(),
        };
        tx.execute(
            &format!(
                "INSERT INTO reminders ({REMINDER_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                reminder.id,
                reminder.user_id,
                reminder.task_id,
                reminder.remind_at,
                reminder.message,
                reminder.notification_type,
                reminder.status,
                reminder.sent_at,
                reminder.created_at,
            ],
        )?;
        inserted.push(reminder);
    }

    tx.commit()?;
    Ok(inserted)
}

pub fn update_reminder(
    conn: &Connection,
    user_id: &str,
    id: &str,
    updates: &ReminderUpdate,
) -> Result<bool> {
    let mut set_clauses = Vec::new();
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref task_id) = updates.task_id {
        set_clauses.push("task_id = ?");
        params_vec.push(Box::new(task_id.clone()));
    }
    if let Some(remind_at) = updates.remind_at {
        set_clauses.push("remind_at = ?");
        params_vec.push(Box::new(remind_at));
    }
    if let Some(ref message) = updates.message {
        set_clauses.push("message = ?");
        params_vec.push(Box::new(message.clone()));
    }
    if let Some(notification_type) = updates.notification_type {
        set_clauses.push("notification_type = ?");
        params_vec.push(Box::new(notification_type));
    }
    if let Some(status) = updates.status {
        set_clauses.push("status = ?");
        params_vec.push(Box::new(status));
    }

    apply_update(conn, "reminders", set_clauses, params_vec, user_id, id)
}

/// Stamp a delivery outcome and `sent_at`. Callers only pass `Sent` or
/// `Failed`.
pub fn set_reminder_status(
    conn: &Connection,
    user_id: &str,
    id: &str,
    status: ReminderStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE reminders SET status = ?1, sent_at = ?2 WHERE id = ?3 AND user_id = ?4",
        params![status, Utc::now(), id, user_id],
    )?;
    Ok(affected > 0)
}

pub fn delete_reminder(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM reminders WHERE id = ?1 AND user_id = ?2",
        [id, user_id],
    )?;
    Ok(affected > 0)
}

/// Delete every listed reminder owned by the account
pub fn delete_reminders_in(conn: &Connection, user_id: &str, ids: &[String]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM reminders WHERE user_id = ? AND id IN ({})",
        placeholders(ids.len())
    );
    let params = std::iter::once(user_id).chain(ids.iter().map(String::as_str));
    let affected = conn.execute(&sql, params_from_iter(params))?;
    Ok(affected)
}

impl ReminderStore for Connection {
    fn delete_reminders(&self, user_id: &str, ids: &[String]) -> Result<usize> {
        delete_reminders_in(self, user_id, ids)
    }

    fn insert_reminders(&self, user_id: &str, reminders: &[NewReminder]) -> Result<Vec<Reminder>> {
        insert_reminders(self, user_id, reminders)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn write_migrations(dir: &Path) {
        std::fs::write(
            dir.join("001_initial_schema.sql"),
            include_str!("../db/migrations/001_initial_schema.sql"),
        )
        .unwrap();
        std::fs::write(
            dir.join("002_system_logs.sql"),
            include_str!("../db/migrations/002_system_logs.sql"),
        )
        .unwrap();
    }

    pub(crate) fn setup_test_db() -> (TempDir, Connection) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let migrations_dir = temp_dir.path().join("migrations");
        std::fs::create_dir(&migrations_dir).unwrap();

        write_migrations(&migrations_dir);

        let conn = init_db(&db_path, &migrations_dir).unwrap();
        (temp_dir, conn)
    }

    pub(crate) fn make_subject(conn: &Connection, user_id: &str, name: &str) -> Subject {
        ensure_profile(conn, user_id, None).unwrap();
        insert_subject(
            conn,
            user_id,
            &NewSubject {
                name: name.to_string(),
                credits: Some(3),
                ..Default::default()
            },
        )
        .unwrap()
    }

    pub(crate) fn make_task(
        conn: &Connection,
        user_id: &str,
        subject_id: &str,
        title: &str,
        due: Option<DateTime<Utc>>,
        hours_required: f64,
    ) -> Task {
        insert_task(
            conn,
            user_id,
            &NewTask {
                subject_id: subject_id.to_string(),
                title: title.to_string(),
                description: None,
                task_type: TaskType::Assignment,
                due_date: due,
                priority: Priority::Medium,
                hours_required,
                progress_percentage: None,
                status: TaskStatus::Pending,
            },
        )
        .unwrap()
    }

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn new_reminder(task_id: &str, at: DateTime<Utc>) -> NewReminder {
        NewReminder {
            task_id: Some(task_id.to_string()),
            remind_at: at,
            message: None,
            notification_type: NotificationType::Email,
            status: ReminderStatus::Pending,
        }
    }

    // ========== init_db tests ==========

    #[test]
    fn test_init_db_creates_tables() {
        let (_temp_dir, conn) = setup_test_db();

        let tables = [
            "profiles",
            "subjects",
            "tasks",
            "study_plans",
            "progress_logs",
            "reminders",
            "system_logs",
        ];
        for table in tables {
            let exists: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "missing table {table}");
        }
    }

    #[test]
    fn test_init_db_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let migrations_dir = temp_dir.path().join("migrations");
        std::fs::create_dir(&migrations_dir).unwrap();

        write_migrations(&migrations_dir);

        let conn1 = init_db(&db_path, &migrations_dir).unwrap();
        drop(conn1);
        let conn2 = init_db(&db_path, &migrations_dir).unwrap();

        let applied = run_migrations(&conn2, &migrations_dir).unwrap();
        assert_eq!(applied, 0);
    }

    // ========== Profile tests ==========

    #[test]
    fn test_ensure_profile_creates_once() {
        let (_temp_dir, conn) = setup_test_db();

        let first = ensure_profile(&conn, "u1", Some("ada@example.com")).unwrap();
        assert_eq!(first.role, Role::Student);
        assert_eq!(first.email.as_deref(), Some("ada@example.com"));

        let second = ensure_profile(&conn, "u1", None).unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(list_profiles(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_update_profile_settings() {
        let (_temp_dir, conn) = setup_test_db();
        ensure_profile(&conn, "u1", None).unwrap();

        let changes = ProfileChanges {
            reminder_time: NaiveTime::from_hms_opt(18, 30, 0),
            semester_length_weeks: Some(14),
            ..Default::default()
        };
        assert!(update_profile(&conn, "u1", &changes).unwrap());

        let profile = get_profile(&conn, "u1").unwrap().unwrap();
        assert_eq!(profile.reminder_time, NaiveTime::from_hms_opt(18, 30, 0));
        assert_eq!(profile.semester_weeks(), 14);
    }

    #[test]
    fn test_set_role_and_counts() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Physics");
        make_task(&conn, "u1", &subject.id, "Lab report", None, 2.0);
        ensure_profile(&conn, "u2", None).unwrap();

        assert!(set_role(&conn, "u2", Role::Admin).unwrap());
        assert!(!set_role(&conn, "nobody", Role::Admin).unwrap());
        assert!(get_profile(&conn, "u2").unwrap().unwrap().is_admin());

        let counts = system_counts(&conn, Utc::now() - chrono::Duration::days(7)).unwrap();
        assert_eq!(counts.total_users, 2);
        assert_eq!(counts.total_subjects, 1);
        assert_eq!(counts.total_tasks, 1);
        assert_eq!(counts.active_users, 2);
    }

    #[test]
    fn test_system_logs_newest_first() {
        let (_temp_dir, conn) = setup_test_db();
        ensure_profile(&conn, "u1", None).unwrap();
        ensure_profile(&conn, "u1", None).unwrap();

        let logs = recent_system_logs(&conn, 20).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_type, LogType::Success);
        assert_eq!(logs[0].user_id.as_deref(), Some("u1"));

        for i in 0..25 {
            insert_system_log(&conn, None, LogType::Info, &format!("entry {i}")).unwrap();
        }
        let logs = recent_system_logs(&conn, 20).unwrap();
        assert_eq!(logs.len(), 20);
        assert_eq!(logs[0].message, "entry 24");
        assert!(logs[0].user_id.is_none());
    }

    // ========== Subject tests ==========

    #[test]
    fn test_subjects_scoped_to_owner() {
        let (_temp_dir, conn) = setup_test_db();
        let mine = make_subject(&conn, "u1", "Biology");
        make_subject(&conn, "u2", "Chemistry");

        let listed = list_subjects(&conn, "u1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Biology");
        assert_eq!(listed[0].color, DEFAULT_SUBJECT_COLOR);

        assert!(get_subject(&conn, "u2", &mine.id).unwrap().is_none());
        assert!(!delete_subject(&conn, "u2", &mine.id).unwrap());
        assert!(delete_subject(&conn, "u1", &mine.id).unwrap());
    }

    #[test]
    fn test_update_subject() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "History");

        let updates = SubjectUpdate {
            instructor: Some("Dr. Vega".to_string()),
            credits: Some(4),
            ..Default::default()
        };
        assert!(update_subject(&conn, "u1", &subject.id, &updates).unwrap());

        let updated = get_subject(&conn, "u1", &subject.id).unwrap().unwrap();
        assert_eq!(updated.instructor.as_deref(), Some("Dr. Vega"));
        assert_eq!(updated.credits, Some(4));
        assert_eq!(updated.name, "History");

        assert!(!update_subject(&conn, "u1", &subject.id, &SubjectUpdate::default()).unwrap());
    }

    #[test]
    fn test_delete_subject_cascades() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Art");
        let task = make_task(&conn, "u1", &subject.id, "Portfolio", None, 5.0);
        insert_log(
            &conn,
            "u1",
            &NewProgressLog {
                subject_id: subject.id.clone(),
                task_id: Some(task.id.clone()),
                date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                hours_studied: 1.0,
                notes: None,
            },
        )
        .unwrap();

        delete_subject(&conn, "u1", &subject.id).unwrap();

        assert!(list_tasks(&conn, "u1", &TaskFilter::default()).unwrap().is_empty());
        assert!(list_logs(&conn, "u1", &LogFilter::default()).unwrap().is_empty());
    }

    // ========== Task tests ==========

    #[test]
    fn test_insert_and_get_task() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let due = ts(2025, 6, 10, 9);
        let task = make_task(&conn, "u1", &subject.id, "Problem set 3", Some(due), 4.5);

        let loaded = get_task(&conn, "u1", &task.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Problem set 3");
        assert_eq!(loaded.due_date, Some(due));
        assert_eq!(loaded.hours_required, 4.5);
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.task_type, TaskType::Assignment);
    }

    #[test]
    fn test_list_tasks_sorted_and_filtered() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let late = make_task(&conn, "u1", &subject.id, "Late", Some(ts(2025, 6, 20, 9)), 1.0);
        make_task(&conn, "u1", &subject.id, "Undated", None, 1.0);
        let early = make_task(&conn, "u1", &subject.id, "Early", Some(ts(2025, 6, 5, 9)), 1.0);
        set_task_status(&conn, "u1", &early.id, TaskStatus::Completed).unwrap();

        let all = list_tasks(&conn, "u1", &TaskFilter::default()).unwrap();
        let titles: Vec<&str> = all.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Early", "Late", "Undated"]);

        let open = list_tasks(
            &conn,
            "u1",
            &TaskFilter {
                exclude_completed: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(open.len(), 2);

        let upcoming = list_tasks(
            &conn,
            "u1",
            &TaskFilter {
                due_from: Some(ts(2025, 6, 10, 0)),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, late.id);
    }

    #[test]
    fn test_status_change_stamps_completion() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let task = make_task(&conn, "u1", &subject.id, "Quiz prep", None, 1.0);

        set_task_status(&conn, "u1", &task.id, TaskStatus::Completed).unwrap();
        let done = get_task(&conn, "u1", &task.id).unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.completed_at.is_some());

        // Any state may be reset to pending
        set_task_status(&conn, "u1", &task.id, TaskStatus::Pending).unwrap();
        let reset = get_task(&conn, "u1", &task.id).unwrap().unwrap();
        assert_eq!(reset.status, TaskStatus::Pending);
        assert!(reset.completed_at.is_none());
    }

    #[test]
    fn test_update_nonexistent_task() {
        let (_temp_dir, conn) = setup_test_db();
        let updates = TaskUpdate {
            title: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!update_task(&conn, "u1", "nonexistent", &updates).unwrap());
    }

    #[test]
    fn test_delete_task_cascades_reminders_and_detaches_logs() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let task = make_task(&conn, "u1", &subject.id, "Essay", None, 2.0);
        insert_reminders(&conn, "u1", &[new_reminder(&task.id, ts(2025, 6, 8, 7))]).unwrap();
        insert_log(
            &conn,
            "u1",
            &NewProgressLog {
                subject_id: subject.id.clone(),
                task_id: Some(task.id.clone()),
                date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                hours_studied: 1.0,
                notes: None,
            },
        )
        .unwrap();

        assert!(delete_task(&conn, "u1", &task.id).unwrap());

        assert!(list_reminders(&conn, "u1").unwrap().is_empty());
        let logs = list_logs(&conn, "u1", &LogFilter::default()).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].task_id.is_none());
    }

    // ========== Progress log tests ==========

    #[test]
    fn test_list_logs_filters() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let t1 = make_task(&conn, "u1", &subject.id, "A", None, 2.0);
        let t2 = make_task(&conn, "u1", &subject.id, "B", None, 2.0);

        for (task_id, day) in [(Some(&t1.id), 1), (Some(&t2.id), 3), (None, 5)] {
            insert_log(
                &conn,
                "u1",
                &NewProgressLog {
                    subject_id: subject.id.clone(),
                    task_id: task_id.cloned(),
                    date: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
                    hours_studied: 1.0,
                    notes: None,
                },
            )
            .unwrap();
        }

        let all = list_logs(&conn, "u1", &LogFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].date, NaiveDate::from_ymd_opt(2025, 6, 5).unwrap());

        let for_t1 = list_logs(
            &conn,
            "u1",
            &LogFilter {
                task_ids: Some(vec![t1.id.clone()]),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(for_t1.len(), 1);

        let none = list_logs(
            &conn,
            "u1",
            &LogFilter {
                task_ids: Some(Vec::new()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(none.is_empty());

        let recent = list_logs(
            &conn,
            "u1",
            &LogFilter {
                date_from: NaiveDate::from_ymd_opt(2025, 6, 3),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_zero_hours_rejected_by_storage() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let result = insert_log(
            &conn,
            "u1",
            &NewProgressLog {
                subject_id: subject.id,
                task_id: None,
                date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                hours_studied: 0.0,
                notes: None,
            },
        );
        assert!(result.is_err());
    }

    // ========== Study plan tests ==========

    #[test]
    fn test_insert_and_list_plans() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let new = NewStudyPlan {
            subject_id: subject.id.clone(),
            task_id: None,
            day_of_week: 2,
            start_time: "14:00".to_string(),
            end_time: "15:30".to_string(),
            recurrence: Recurrence::Weekly,
            location: Some("Library".to_string()),
            notes: None,
            new_task: None,
        };
        let slot = Slot::parse(2, "14:00", "15:30").unwrap();
        insert_plan(&conn, "u1", &new, slot).unwrap();

        let tuesday = list_plans(&conn, "u1", Some(2)).unwrap();
        assert_eq!(tuesday.len(), 1);
        assert_eq!(tuesday[0].start_time, NaiveTime::from_hms_opt(14, 0, 0).unwrap());
        assert_eq!(tuesday[0].end_time, NaiveTime::from_hms_opt(15, 30, 0).unwrap());
        assert!(list_plans(&conn, "u1", Some(3)).unwrap().is_empty());
        assert_eq!(list_plans(&conn, "u1", None).unwrap().len(), 1);

        assert!(delete_plan(&conn, "u1", &tuesday[0].id).unwrap());
    }

    // ========== Reminder tests ==========

    #[test]
    fn test_insert_and_list_reminders_sorted() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let task = make_task(&conn, "u1", &subject.id, "Exam", None, 2.0);

        let inserted = insert_reminders(
            &conn,
            "u1",
            &[
                new_reminder(&task.id, ts(2025, 6, 10, 7)),
                new_reminder(&task.id, ts(2025, 6, 8, 7)),
            ],
        )
        .unwrap();
        assert_eq!(inserted.len(), 2);

        let listed = list_reminders(&conn, "u1").unwrap();
        assert_eq!(listed[0].remind_at, ts(2025, 6, 8, 7));
        assert_eq!(listed[1].remind_at, ts(2025, 6, 10, 7));
        assert_eq!(listed[0].status, ReminderStatus::Pending);
    }

    #[test]
    fn test_duplicate_reminders_allowed_by_storage() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let task = make_task(&conn, "u1", &subject.id, "Exam", None, 2.0);
        let at = ts(2025, 6, 8, 7);

        insert_reminders(&conn, "u1", &[new_reminder(&task.id, at)]).unwrap();
        insert_reminders(&conn, "u1", &[new_reminder(&task.id, at)]).unwrap();
        assert_eq!(list_reminders(&conn, "u1").unwrap().len(), 2);
    }

    #[test]
    fn test_delete_reminders_in_scoped() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let task = make_task(&conn, "u1", &subject.id, "Exam", None, 2.0);
        let inserted = insert_reminders(
            &conn,
            "u1",
            &[
                new_reminder(&task.id, ts(2025, 6, 8, 7)),
                new_reminder(&task.id, ts(2025, 6, 9, 7)),
                new_reminder(&task.id, ts(2025, 6, 10, 7)),
            ],
        )
        .unwrap();
        let ids: Vec<String> = inserted.iter().take(2).map(|r| r.id.clone()).collect();

        assert_eq!(delete_reminders_in(&conn, "someone-else", &ids).unwrap(), 0);
        assert_eq!(delete_reminders_in(&conn, "u1", &ids).unwrap(), 2);
        assert_eq!(delete_reminders_in(&conn, "u1", &[]).unwrap(), 0);
        assert_eq!(list_reminders(&conn, "u1").unwrap().len(), 1);
    }

    #[test]
    fn test_reminder_status_and_update() {
        let (_temp_dir, conn) = setup_test_db();
        let subject = make_subject(&conn, "u1", "Math");
        let task = make_task(&conn, "u1", &subject.id, "Exam", None, 2.0);
        let inserted =
            insert_reminders(&conn, "u1", &[new_reminder(&task.id, ts(2025, 6, 8, 7))]).unwrap();
        let id = &inserted[0].id;

        assert!(set_reminder_status(&conn, "u1", id, ReminderStatus::Sent).unwrap());
        let sent = get_reminder(&conn, "u1", id).unwrap().unwrap();
        assert_eq!(sent.status, ReminderStatus::Sent);
        assert!(sent.sent_at.is_some());

        let updates = ReminderUpdate {
            message: Some("Bring a calculator".to_string()),
            notification_type: Some(NotificationType::Both),
            ..Default::default()
        };
        assert!(update_reminder(&conn, "u1", id, &updates).unwrap());
        let updated = get_reminder(&conn, "u1", id).unwrap().unwrap();
        assert_eq!(updated.message.as_deref(), Some("Bring a calculator"));
        assert_eq!(updated.notification_type, NotificationType::Both);

        assert!(delete_reminder(&conn, "u1", id).unwrap());
        assert!(get_reminder(&conn, "u1", id).unwrap().is_none());
    }
}
