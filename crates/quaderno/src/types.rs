use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Semester length used when a profile does not carry one
pub const DEFAULT_SEMESTER_WEEKS: u32 = 16;

/// Default time of day for automatic reminders
pub const DEFAULT_REMINDER_TIME: (u32, u32, u32) = (7, 0, 0);

/// Implements the string forms shared by storage and the JSON API.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $s,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($s => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    Mentor,
    Admin,
}

string_enum!(Role {
    Student => "student",
    Mentor => "mentor",
    Admin => "admin",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Assignment,
    Quiz,
    Revision,
    Exam,
    Project,
}

string_enum!(TaskType {
    Assignment => "assignment",
    Quiz => "quiz",
    Revision => "revision",
    Exam => "exam",
    Project => "project",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

string_enum!(Priority {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Task lifecycle. `Overdue` is normally derived for display, see
/// [`Task::display_status`], but is accepted when stored directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Overdue,
}

string_enum!(TaskStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Overdue => "overdue",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Once,
    #[default]
    Weekly,
    Daily,
}

string_enum!(Recurrence {
    Once => "once",
    Weekly => "weekly",
    Daily => "daily",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    #[default]
    Email,
    Push,
    Both,
}

string_enum!(NotificationType {
    Email => "email",
    Push => "push",
    Both => "both",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

string_enum!(ReminderStatus {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

string_enum!(LogType {
    Info => "info",
    Success => "success",
    Warning => "warning",
    Error => "error",
});

/// One per account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    /// Preferred time of day for automatic reminders
    pub reminder_time: Option<NaiveTime>,
    pub semester_length_weeks: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn reminder_time_or_default(&self) -> NaiveTime {
        self.reminder_time.unwrap_or_else(default_reminder_time)
    }

    pub fn semester_weeks(&self) -> u32 {
        self.semester_length_weeks.unwrap_or(DEFAULT_SEMESTER_WEEKS)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn default_reminder_time() -> NaiveTime {
    let (h, m, s) = DEFAULT_REMINDER_TIME;
    NaiveTime::from_hms_opt(h, m, s).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub instructor: Option<String>,
    pub credits: Option<u32>,
    pub semester: Option<String>,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

impl Subject {
    /// Number of classes that can be missed while keeping attendance strictly
    /// above 75%. One class per credit per week is assumed.
    pub fn allowed_absences(&self, semester_weeks: u32) -> Option<u32> {
        let credits = self.credits.filter(|c| *c > 0)?;
        let total = u64::from(credits) * u64::from(semester_weeks);
        // ceil(total / 4) - 1, floored at zero
        let allowed = total.div_ceil(4).saturating_sub(1);
        Some(allowed as u32)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub subject_id: String,
    pub title: String,
    pub description: Option<String>,
    pub task_type: TaskType,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub hours_required: f64,
    pub progress_percentage: Option<u8>,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Status shown to the user: a task that is not completed and whose due
    /// date has passed reads as overdue.
    pub fn display_status(&self, now: DateTime<Utc>) -> TaskStatus {
        match (self.status, self.due_date) {
            (TaskStatus::Completed, _) => TaskStatus::Completed,
            (_, Some(due)) if due < now => TaskStatus::Overdue,
            (status, _) => status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressLog {
    pub id: String,
    pub user_id: String,
    pub subject_id: String,
    pub task_id: Option<String>,
    pub date: NaiveDate,
    pub hours_studied: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A weekly calendar block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudyPlan {
    pub id: String,
    pub user_id: String,
    pub subject_id: String,
    pub task_id: Option<String>,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurrence: Recurrence,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reminder {
    pub id: String,
    pub user_id: String,
    pub task_id: Option<String>,
    pub remind_at: DateTime<Utc>,
    pub message: Option<String>,
    pub notification_type: NotificationType,
    pub status: ReminderStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Audit entry listed on the admin overview
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemLog {
    pub id: String,
    /// Account that triggered the entry, if any
    pub user_id: Option<String>,
    pub log_type: LogType,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// ========== Inputs ==========

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NewSubject {
    pub name: String,
    pub instructor: Option<String>,
    pub credits: Option<u32>,
    pub semester: Option<String>,
    pub color: Option<String>,
}

impl NewSubject {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("Subject name is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub subject_id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub task_type: TaskType,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub hours_required: f64,
    pub progress_percentage: Option<u8>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl NewTask {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("Task title is required"));
        }
        if self.subject_id.is_empty() {
            return Err(AppError::validation("Task must belong to a subject"));
        }
        validate_hours_required(self.hours_required)?;
        if let Some(p) = self.progress_percentage {
            validate_percentage(p)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProgressLog {
    pub subject_id: String,
    pub task_id: Option<String>,
    pub date: NaiveDate,
    pub hours_studied: f64,
    pub notes: Option<String>,
}

impl NewProgressLog {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.subject_id.is_empty() {
            return Err(AppError::validation("Progress log must belong to a subject"));
        }
        validate_hours_studied(self.hours_studied)
    }
}

/// Study block as submitted; times are validated by the planner before insert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStudyPlan {
    pub subject_id: String,
    pub task_id: Option<String>,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub recurrence: Recurrence,
    pub location: Option<String>,
    pub notes: Option<String>,
    /// Task to create and attach in the same submission
    pub new_task: Option<PlanTask>,
}

/// A task created from the planner. Unlike [`NewTask`] it must carry a due
/// date and a positive estimate.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanTask {
    pub title: String,
    #[serde(default)]
    pub task_type: TaskType,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub hours_required: f64,
}

impl PlanTask {
    pub fn validate(&self) -> Result<(), AppError> {
        let hours_ok = self.hours_required.is_finite() && self.hours_required > 0.0;
        if self.title.trim().is_empty() || !hours_ok || self.due_date.is_none() {
            return Err(AppError::validation(
                "Please provide title, valid hours (>0) and due date for the new task",
            ));
        }
        Ok(())
    }

    pub fn into_new_task(self, subject_id: &str) -> NewTask {
        NewTask {
            subject_id: subject_id.to_string(),
            title: self.title,
            description: None,
            task_type: self.task_type,
            due_date: self.due_date,
            priority: self.priority,
            hours_required: self.hours_required,
            progress_percentage: Some(0),
            status: TaskStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NewReminder {
    pub task_id: Option<String>,
    pub remind_at: DateTime<Utc>,
    pub message: Option<String>,
    #[serde(default)]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub status: ReminderStatus,
}

// ========== Partial updates ==========

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SubjectUpdate {
    pub name: Option<String>,
    pub instructor: Option<String>,
    pub credits: Option<u32>,
    pub semester: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskUpdate {
    pub subject_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub task_type: Option<TaskType>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub hours_required: Option<f64>,
    pub progress_percentage: Option<u8>,
    pub status: Option<TaskStatus>,
}

impl TaskUpdate {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(ref title) = self.title {
            if title.trim().is_empty() {
                return Err(AppError::validation("Task title is required"));
            }
        }
        if let Some(hours) = self.hours_required {
            validate_hours_required(hours)?;
        }
        if let Some(p) = self.progress_percentage {
            validate_percentage(p)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReminderUpdate {
    pub task_id: Option<String>,
    pub remind_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub notification_type: Option<NotificationType>,
    pub status: Option<ReminderStatus>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub reminder_time: Option<String>,
    pub semester_length_weeks: Option<i64>,
}

fn validate_hours_required(hours: f64) -> Result<(), AppError> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(AppError::validation("Required hours must be zero or more"));
    }
    Ok(())
}

pub fn validate_hours_studied(hours: f64) -> Result<(), AppError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(AppError::validation("Please enter valid hours studied"));
    }
    Ok(())
}

pub fn validate_percentage(p: u8) -> Result<(), AppError> {
    if p > 100 {
        return Err(AppError::validation("Progress must be between 0 and 100"));
    }
    Ok(())
}
