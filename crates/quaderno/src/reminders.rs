//! Reminder reconciliation.
//!
//! On every load of the reminder console the stored reminders are
//! deduplicated by `(task, remind_at)`, the two automatic reminders for each
//! incomplete task (two days before the due date and on the due date, at the
//! user's preferred time of day) are created when missing, and the merged set
//! is returned sorted by `remind_at`.
//!
//! There is no transaction around the read-modify-write: two concurrent
//! reconciliations can leave transient duplicates, which the next run removes.

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::types::{NewReminder, NotificationType, Reminder, ReminderStatus, Task};

/// Backing store operations the reconciler needs
pub trait ReminderStore {
    /// Delete the given reminder rows, returning how many were removed
    fn delete_reminders(&self, user_id: &str, ids: &[String]) -> Result<usize>;

    /// Insert reminders and return the stored rows
    fn insert_reminders(&self, user_id: &str, reminders: &[NewReminder]) -> Result<Vec<Reminder>>;
}

/// When automatic reminders fire
#[derive(Debug, Clone, Copy)]
pub struct ReminderSchedule {
    pub time_of_day: NaiveTime,
    /// Zone in which `time_of_day` and the due date's calendar day are read
    pub offset: FixedOffset,
}

impl ReminderSchedule {
    pub fn new(time_of_day: NaiveTime, offset: FixedOffset) -> Self {
        Self {
            time_of_day,
            offset,
        }
    }

    /// The two automatic reminder instants for a due date:
    /// two days before, then the due day itself.
    pub fn candidates(&self, due: DateTime<Utc>) -> [DateTime<Utc>; 2] {
        let due_day = due.with_timezone(&self.offset).date_naive();
        let at = |day: chrono::NaiveDate| {
            let local = day.and_time(self.time_of_day);
            // A fixed offset maps every local time to exactly one instant
            self.offset
                .from_local_datetime(&local)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&local))
        };
        [at(due_day - Duration::days(2)), at(due_day)]
    }
}

/// Composite identity of a reminder: task id plus the instant in ISO form.
pub fn reminder_key(task_id: Option<&str>, remind_at: DateTime<Utc>) -> String {
    format!(
        "{}::{}",
        task_id.unwrap_or("null"),
        remind_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

fn key_of(reminder: &Reminder) -> String {
    reminder_key(reminder.task_id.as_deref(), reminder.remind_at)
}

/// Result of deduplicating stored reminders
#[derive(Debug, Default)]
pub struct Dedup {
    /// First row seen for each key, in first-seen order
    pub kept: Vec<Reminder>,
    /// Ids of the extra rows, to be removed from the store
    pub duplicate_ids: Vec<String>,
}

pub fn deduplicate(reminders: Vec<Reminder>) -> Dedup {
    let mut seen: HashSet<String> = HashSet::new();
    let mut dedup = Dedup::default();

    for reminder in reminders {
        if seen.insert(key_of(&reminder)) {
            dedup.kept.push(reminder);
        } else {
            dedup.duplicate_ids.push(reminder.id);
        }
    }

    dedup
}

/// Automatic reminders missing for the given incomplete tasks.
///
/// Only candidates strictly after `now` with no existing reminder for the
/// same `(task, instant)` are returned.
pub fn missing_reminders(
    tasks: &[Task],
    existing: &[Reminder],
    schedule: &ReminderSchedule,
    now: DateTime<Utc>,
) -> Vec<NewReminder> {
    let mut known: HashSet<String> = existing.iter().map(key_of).collect();
    let mut missing = Vec::new();

    for task in tasks.iter().filter(|t| !t.is_completed()) {
        let Some(due) = task.due_date else {
            continue;
        };

        for candidate in schedule.candidates(due) {
            if candidate <= now {
                continue;
            }
            if known.insert(reminder_key(Some(&task.id), candidate)) {
                missing.push(NewReminder {
                    task_id: Some(task.id.clone()),
                    remind_at: candidate,
                    message: Some(reminder_message(task, due, schedule.offset)),
                    notification_type: NotificationType::Email,
                    status: ReminderStatus::Pending,
                });
            }
        }
    }

    missing
}

fn reminder_message(task: &Task, due: DateTime<Utc>, offset: FixedOffset) -> String {
    format!(
        "Reminder: \"{}\" is due on {}",
        task.title,
        due.with_timezone(&offset).format("%Y-%m-%d %H:%M")
    )
}

/// Combine surviving and newly inserted reminders, first seen wins, sorted
/// ascending by `remind_at`.
pub fn merge(existing: Vec<Reminder>, inserted: Vec<Reminder>) -> Vec<Reminder> {
    let mut merged = deduplicate(existing.into_iter().chain(inserted).collect()).kept;
    sort_by_time(&mut merged);
    merged
}

fn sort_by_time(reminders: &mut [Reminder]) {
    reminders.sort_by(|a, b| a.remind_at.cmp(&b.remind_at));
}

/// Outcome of one reconciliation pass
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub reminders: Vec<Reminder>,
    /// Duplicate rows dropped from the result (and, best effort, from the store)
    pub removed: Vec<String>,
    pub inserted: usize,
}

/// Deduplicate, synthesize missing automatic reminders and merge.
///
/// Failing to delete duplicates is logged and ignored. Failing to insert new
/// reminders falls back to the deduplicated existing set.
pub fn reconcile<S: ReminderStore + ?Sized>(
    store: &S,
    user_id: &str,
    existing: Vec<Reminder>,
    incomplete_tasks: &[Task],
    schedule: &ReminderSchedule,
    now: DateTime<Utc>,
) -> Reconciliation {
    let Dedup {
        kept,
        duplicate_ids,
    } = deduplicate(existing);

    if !duplicate_ids.is_empty() {
        match store.delete_reminders(user_id, &duplicate_ids) {
            Ok(count) => info!(count = count, "Removed duplicate reminders"),
            Err(e) => warn!(
                error = %e,
                count = duplicate_ids.len(),
                "Failed to remove duplicate reminders (non-fatal)"
            ),
        }
    }

    let missing = missing_reminders(incomplete_tasks, &kept, schedule, now);
    if missing.is_empty() {
        let mut reminders = kept;
        sort_by_time(&mut reminders);
        return Reconciliation {
            reminders,
            removed: duplicate_ids,
            inserted: 0,
        };
    }

    match store.insert_reminders(user_id, &missing) {
        Ok(inserted) => {
            debug!(count = inserted.len(), "Inserted automatic reminders");
            let count = inserted.len();
            Reconciliation {
                reminders: merge(kept, inserted),
                removed: duplicate_ids,
                inserted: count,
            }
        }
        Err(e) => {
            error!(error = %e, "Automatic reminder generation failed");
            let mut reminders = kept;
            sort_by_time(&mut reminders);
            Reconciliation {
                reminders,
                removed: duplicate_ids,
                inserted: 0,
            }
        }
    }
}

/// Display bucket for a reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Upcoming,
    Past,
}

/// Upcoming iff pending, strictly in the future, and its task not completed.
pub fn classify(reminder: &Reminder, task_completed: bool, now: DateTime<Utc>) -> Bucket {
    if reminder.status == ReminderStatus::Pending && reminder.remind_at > now && !task_completed {
        Bucket::Upcoming
    } else {
        Bucket::Past
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ReminderBoard {
    pub upcoming: Vec<Reminder>,
    pub past: Vec<Reminder>,
}

/// Split reminders into upcoming and past, preserving order.
pub fn board<F>(reminders: Vec<Reminder>, is_task_completed: F, now: DateTime<Utc>) -> ReminderBoard
where
    F: Fn(&str) -> bool,
{
    let mut board = ReminderBoard::default();
    for reminder in reminders {
        let completed = reminder
            .task_id
            .as_deref()
            .map(&is_task_completed)
            .unwrap_or(false);
        match classify(&reminder, completed, now) {
            Bucket::Upcoming => board.upcoming.push(reminder),
            Bucket::Past => board.past.push(reminder),
        }
    }
    board
}
