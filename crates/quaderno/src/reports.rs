//! Reports over a time range: per-subject performance, weekly study hours
//! and a task status breakdown.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::db::{self, LogFilter, TaskFilter};
use crate::progress::round_one_decimal;
use crate::types::{ProgressLog, Subject, Task, TaskStatus};

/// Weeks kept in the weekly progress series
const WEEKS_SHOWN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportRange {
    Week,
    #[default]
    Month,
    All,
}

impl ReportRange {
    /// Earliest instant included. `All` reaches back one year.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let months_back = |n: u32| {
            now.checked_sub_months(Months::new(n))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        };
        match self {
            ReportRange::Week => now - Duration::days(7),
            ReportRange::Month => months_back(1),
            ReportRange::All => months_back(12),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectPerformance {
    pub subject_id: String,
    pub name: String,
    pub color: String,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    pub hours_studied: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyProgress {
    /// Sunday starting the week
    pub week_start: NaiveDate,
    pub hours: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub overdue: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub range: ReportRange,
    pub subject_performance: Vec<SubjectPerformance>,
    pub weekly_progress: Vec<WeeklyProgress>,
    pub status_breakdown: StatusBreakdown,
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// One row per subject that has tasks in range, in order of first appearance.
pub fn subject_performance(
    subjects: &[Subject],
    tasks: &[Task],
    logs: &[ProgressLog],
) -> Vec<SubjectPerformance> {
    let by_id: HashMap<&str, &Subject> = subjects.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut hours: HashMap<&str, f64> = HashMap::new();
    for log in logs {
        *hours.entry(log.subject_id.as_str()).or_default() += log.hours_studied;
    }

    let mut rows: Vec<SubjectPerformance> = Vec::new();
    for task in tasks {
        let Some(subject) = by_id.get(task.subject_id.as_str()) else {
            continue;
        };
        let idx = match rows.iter().position(|r| r.subject_id == subject.id) {
            Some(idx) => idx,
            None => {
                rows.push(SubjectPerformance {
                    subject_id: subject.id.clone(),
                    name: subject.name.clone(),
                    color: subject.color.clone(),
                    completed_tasks: 0,
                    total_tasks: 0,
                    hours_studied: round_one_decimal(
                        hours.get(subject.id.as_str()).copied().unwrap_or(0.0),
                    ),
                });
                rows.len() - 1
            }
        };
        rows[idx].total_tasks += 1;
        if task.is_completed() {
            rows[idx].completed_tasks += 1;
        }
    }
    rows
}

/// Hours per week (Sunday start), oldest first, last eight weeks only.
pub fn weekly_progress(logs: &[ProgressLog]) -> Vec<WeeklyProgress> {
    let mut weeks: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for log in logs {
        *weeks.entry(week_start(log.date)).or_default() += log.hours_studied;
    }

    let skip = weeks.len().saturating_sub(WEEKS_SHOWN);
    weeks
        .into_iter()
        .skip(skip)
        .map(|(week_start, hours)| WeeklyProgress {
            week_start,
            hours: round_one_decimal(hours),
        })
        .collect()
}

/// Counts by displayed status, so past-due open tasks count as overdue.
pub fn status_breakdown(tasks: &[Task], now: DateTime<Utc>) -> StatusBreakdown {
    let mut breakdown = StatusBreakdown::default();
    for task in tasks {
        match task.display_status(now) {
            TaskStatus::Pending => breakdown.pending += 1,
            TaskStatus::InProgress => breakdown.in_progress += 1,
            TaskStatus::Completed => breakdown.completed += 1,
            TaskStatus::Overdue => breakdown.overdue += 1,
        }
    }
    breakdown
}

pub fn build(
    range: ReportRange,
    subjects: &[Subject],
    tasks: &[Task],
    logs: &[ProgressLog],
    now: DateTime<Utc>,
) -> Report {
    Report {
        range,
        subject_performance: subject_performance(subjects, tasks, logs),
        weekly_progress: weekly_progress(logs),
        status_breakdown: status_breakdown(tasks, now),
    }
}

/// Load a report for the account. Tasks are filtered by creation time and
/// logs by date.
pub fn load(conn: &Connection, user_id: &str, range: ReportRange, now: DateTime<Utc>) -> Result<Report> {
    let start = range.start(now);
    let subjects = db::list_subjects(conn, user_id)?;
    let tasks = db::list_tasks(
        conn,
        user_id,
        &TaskFilter {
            created_from: Some(start),
            ..Default::default()
        },
    )?;
    let logs = db::list_logs(
        conn,
        user_id,
        &LogFilter {
            date_from: Some(start.date_naive()),
            ..Default::default()
        },
    )?;

    Ok(build(range, &subjects, &tasks, &logs, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{make_subject, make_task, setup_test_db};
    use crate::types::{NewProgressLog, Priority, TaskType};
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn subject(id: &str, name: &str) -> Subject {
        Subject {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: name.to_string(),
            instructor: None,
            credits: None,
            semester: None,
            color: "#10B981".to_string(),
            created_at: Utc::now(),
        }
    }

    fn task(subject_id: &str, status: TaskStatus, due: Option<DateTime<Utc>>) -> Task {
        Task {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: "u1".to_string(),
            subject_id: subject_id.to_string(),
            title: "Task".to_string(),
            description: None,
            task_type: TaskType::Assignment,
            due_date: due,
            priority: Priority::Medium,
            hours_required: 1.0,
            progress_percentage: None,
            status,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    fn log(subject_id: &str, on: NaiveDate, hours: f64) -> ProgressLog {
        ProgressLog {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: "u1".to_string(),
            subject_id: subject_id.to_string(),
            task_id: None,
            date: on,
            hours_studied: hours,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_range_start() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 10, 0, 0).unwrap();
        assert_eq!(
            ReportRange::Week.start(now),
            Utc.with_ymd_and_hms(2025, 3, 24, 10, 0, 0).unwrap()
        );
        // Clamped to the end of February
        assert_eq!(
            ReportRange::Month.start(now),
            Utc.with_ymd_and_hms(2025, 2, 28, 10, 0, 0).unwrap()
        );
        assert_eq!(
            ReportRange::All.start(now),
            Utc.with_ymd_and_hms(2024, 3, 31, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_range_parses_lowercase() {
        let range: ReportRange = serde_json::from_str("\"week\"").unwrap();
        assert_eq!(range, ReportRange::Week);
        assert_eq!(ReportRange::default(), ReportRange::Month);
    }

    #[test]
    fn test_week_start_is_sunday() {
        // 2025-06-04 is a Wednesday
        assert_eq!(week_start(date(2025, 6, 4)), date(2025, 6, 1));
        assert_eq!(week_start(date(2025, 6, 1)), date(2025, 6, 1));
        assert_eq!(week_start(date(2025, 6, 7)), date(2025, 6, 1));
    }

    #[test]
    fn test_subject_performance() {
        let subjects = vec![subject("math", "Math"), subject("bio", "Biology"), subject("art", "Art")];
        let tasks = vec![
            task("bio", TaskStatus::Completed, None),
            task("math", TaskStatus::Pending, None),
            task("bio", TaskStatus::Pending, None),
        ];
        let logs = vec![
            log("bio", date(2025, 6, 1), 1.25),
            log("bio", date(2025, 6, 2), 2.0),
            log("art", date(2025, 6, 2), 5.0),
        ];

        let rows = subject_performance(&subjects, &tasks, &logs);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Biology");
        assert_eq!(rows[0].total_tasks, 2);
        assert_eq!(rows[0].completed_tasks, 1);
        assert_eq!(rows[0].hours_studied, 3.3);
        assert_eq!(rows[1].name, "Math");
        assert_eq!(rows[1].hours_studied, 0.0);
    }

    #[test]
    fn test_weekly_progress_buckets_and_limits() {
        let mut logs = vec![
            log("math", date(2025, 6, 2), 1.0),
            log("math", date(2025, 6, 5), 0.6),
        ];
        // Ten earlier weeks, one log each
        for week in 1..=10 {
            logs.push(log("math", date(2025, 6, 2) - Duration::weeks(week), 1.0));
        }

        let series = weekly_progress(&logs);
        assert_eq!(series.len(), WEEKS_SHOWN);
        let last = series.last().unwrap();
        assert_eq!(last.week_start, date(2025, 6, 1));
        assert_eq!(last.hours, 1.6);
        assert!(series.windows(2).all(|w| w[0].week_start < w[1].week_start));
    }

    #[test]
    fn test_status_breakdown_derives_overdue() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let tasks = vec![
            task("math", TaskStatus::Pending, Some(now + Duration::days(1))),
            task("math", TaskStatus::Pending, Some(now - Duration::days(1))),
            task("math", TaskStatus::InProgress, None),
            task("math", TaskStatus::Completed, Some(now - Duration::days(3))),
        ];

        assert_eq!(
            status_breakdown(&tasks, now),
            StatusBreakdown {
                pending: 1,
                in_progress: 1,
                completed: 1,
                overdue: 1,
            }
        );
    }

    #[test]
    fn test_load_filters_logs_by_date() {
        let (_temp_dir, conn) = setup_test_db();
        let math = make_subject(&conn, "u1", "Math");
        make_task(&conn, "u1", &math.id, "Recent", None, 2.0);

        let now = Utc::now();
        for (days_ago, hours) in [(2, 1.5), (40, 3.0)] {
            db::insert_log(
                &conn,
                "u1",
                &NewProgressLog {
                    subject_id: math.id.clone(),
                    task_id: None,
                    date: (now - Duration::days(days_ago)).date_naive(),
                    hours_studied: hours,
                    notes: None,
                },
            )
            .unwrap();
        }

        let week = load(&conn, "u1", ReportRange::Week, now).unwrap();
        assert_eq!(week.subject_performance.len(), 1);
        assert_eq!(week.subject_performance[0].hours_studied, 1.5);
        assert_eq!(week.status_breakdown.pending, 1);

        let all = load(&conn, "u1", ReportRange::All, now).unwrap();
        assert_eq!(all.subject_performance[0].hours_studied, 4.5);
    }
}
