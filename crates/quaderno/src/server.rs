use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::completion::{self, TaskProgressEntry};
use crate::config::Config;
use crate::dashboard::{self, Dashboard};
use crate::db::{self, LogFilter, ProfileChanges, SystemCounts, TaskFilter};
use crate::error::AppError;
use crate::html;
use crate::planner::{check_new_plan, parse_time_of_day};
use crate::progress::{annotate, TaskWithProgress};
use crate::reminders::{self, ReminderBoard, ReminderSchedule};
use crate::reports::{self, Report, ReportRange};
use crate::schedule::SCHEDULING_DISABLED;
use crate::types::{
    LogType, NewProgressLog, NewReminder, NewStudyPlan, NewSubject, NewTask, Priority, Profile,
    ProfileUpdate, ProgressLog, Reminder, ReminderStatus, ReminderUpdate, Role, StudyPlan, Subject,
    SubjectUpdate, SystemLog, Task, TaskStatus, TaskUpdate,
};

/// Header set by the fronting auth layer
pub const USER_HEADER: &str = "x-user-id";

/// Application state shared across requests
pub struct AppState {
    pub db: Mutex<Connection>,
    pub config: Config,
}

impl AppState {
    pub fn new(conn: Connection, config: Config) -> Self {
        Self {
            db: Mutex::new(conn),
            config,
        }
    }
}

type SharedState = Arc<AppState>;
type ApiResult<T> = Result<T, AppError>;

/// The signed-in account, from the `x-user-id` header or the configured
/// default user. Its profile is created on first sight.
pub struct CurrentUser {
    pub id: String,
    pub profile: Profile,
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| state.config.default_user.clone())
            .ok_or(AppError::Unauthorized)?;

        let conn = state.db.lock().await;
        let profile = db::ensure_profile(&conn, &id, None)?;
        Ok(CurrentUser { id, profile })
    }
}

/// Build the application router
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/subjects", get(list_subjects).post(create_subject))
        .route("/api/subjects/{id}", put(update_subject).delete(delete_subject))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", put(update_task).delete(delete_task))
        .route("/api/tasks/{id}/status", post(change_task_status))
        .route("/api/tasks/{id}/progress", post(log_task_progress))
        .route("/api/progress", get(list_logs).post(create_log))
        .route("/api/progress/{id}", delete(delete_log))
        .route("/api/plans", get(list_plans).post(create_plan))
        .route("/api/plans/{id}", delete(delete_plan))
        .route("/api/reminders", get(reminder_board).post(create_reminder))
        .route("/api/reminders/{id}", put(update_reminder).delete(delete_reminder))
        .route("/api/reminders/{id}/status", post(change_reminder_status))
        .route("/api/reports", get(report_handler))
        .route("/api/profile", get(get_profile).put(update_profile))
        .route("/api/admin/overview", get(admin_overview))
        .route("/api/admin/users/{id}/role", put(admin_set_role))
        .route(
            "/functions/v1/generate-schedule",
            post(generate_schedule).options(schedule_preflight),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    let conn = db::init_db(&config.db_path, &config.migrations_dir)?;
    let addr = format!("{}:{}", config.bind, port);
    let state = Arc::new(AppState::new(conn, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Server running");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ========== Dashboard ==========

async fn index_handler(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> ApiResult<Html<String>> {
    let conn = state.db.lock().await;
    let offset = state.config.utc_offset;
    let dashboard = dashboard::load(&conn, &user.id, Utc::now(), offset)?;
    let subjects = db::list_subjects(&conn, &user.id)?;
    let markup = html::render_page(&user.profile, &dashboard, &subjects, offset);
    Ok(Html(markup.into_string()))
}

async fn dashboard_handler(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> ApiResult<Json<Dashboard>> {
    let conn = state.db.lock().await;
    let dashboard = dashboard::load(&conn, &user.id, Utc::now(), state.config.utc_offset)?;
    Ok(Json(dashboard))
}

// ========== Subjects ==========

#[derive(Debug, Serialize)]
struct SubjectView {
    #[serde(flatten)]
    subject: Subject,
    allowed_absences: Option<u32>,
}

async fn list_subjects(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<SubjectView>>> {
    let conn = state.db.lock().await;
    let weeks = user.profile.semester_weeks();
    let subjects = db::list_subjects(&conn, &user.id)?
        .into_iter()
        .map(|subject| SubjectView {
            allowed_absences: subject.allowed_absences(weeks),
            subject,
        })
        .collect();
    Ok(Json(subjects))
}

async fn create_subject(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(new): Json<NewSubject>,
) -> ApiResult<(StatusCode, Json<Subject>)> {
    new.validate()?;
    let conn = state.db.lock().await;
    let subject = db::insert_subject(&conn, &user.id, &new)?;
    info!(subject = %subject.id, "Created subject");
    Ok((StatusCode::CREATED, Json(subject)))
}

async fn update_subject(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(updates): Json<SubjectUpdate>,
) -> ApiResult<Json<Subject>> {
    if updates.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::validation("Subject name is required"));
    }
    let conn = state.db.lock().await;
    db::update_subject(&conn, &user.id, &id, &updates)?;
    let subject = db::get_subject(&conn, &user.id, &id)?.ok_or(AppError::NotFound("Subject"))?;
    Ok(Json(subject))
}

async fn delete_subject(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let conn = state.db.lock().await;
    if !db::delete_subject(&conn, &user.id, &id)? {
        return Err(AppError::NotFound("Subject"));
    }
    Ok(StatusCode::NO_CONTENT)
}

fn require_subject(conn: &Connection, user_id: &str, subject_id: &str) -> ApiResult<()> {
    db::get_subject(conn, user_id, subject_id)?
        .map(|_| ())
        .ok_or(AppError::NotFound("Subject"))
}

fn require_task(conn: &Connection, user_id: &str, task_id: &str) -> ApiResult<Task> {
    db::get_task(conn, user_id, task_id)?.ok_or(AppError::NotFound("Task"))
}

/// Record an audit entry; a failed write does not fail the request
fn audit(conn: &Connection, user_id: &str, log_type: LogType, message: &str) {
    if let Err(e) = db::insert_system_log(conn, Some(user_id), log_type, message) {
        warn!(error = %e, entry = message, "Failed to write system log");
    }
}

// ========== Tasks ==========

#[derive(Debug, Deserialize)]
struct TaskQuery {
    status: Option<TaskStatus>,
    priority: Option<Priority>,
}

#[derive(Debug, Serialize)]
struct TaskView {
    #[serde(flatten)]
    item: TaskWithProgress,
    display_status: TaskStatus,
}

async fn list_tasks(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Json<Vec<TaskView>>> {
    let conn = state.db.lock().await;
    let filter = TaskFilter {
        status: query.status,
        priority: query.priority,
        ..Default::default()
    };
    let tasks = db::list_tasks(&conn, &user.id, &filter)?;
    let logs = db::list_logs(
        &conn,
        &user.id,
        &LogFilter {
            task_ids: Some(tasks.iter().map(|t| t.id.clone()).collect()),
            ..Default::default()
        },
    )?;

    let now = Utc::now();
    let views = annotate(&tasks, &logs)
        .into_iter()
        .map(|item| TaskView {
            display_status: item.task.display_status(now),
            item,
        })
        .collect();
    Ok(Json(views))
}

async fn create_task(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(new): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    new.validate()?;
    let conn = state.db.lock().await;
    require_subject(&conn, &user.id, &new.subject_id)?;
    let task = db::insert_task(&conn, &user.id, &new)?;
    info!(task = %task.id, "Created task");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(updates): Json<TaskUpdate>,
) -> ApiResult<Json<Task>> {
    updates.validate()?;
    let conn = state.db.lock().await;
    if let Some(ref subject_id) = updates.subject_id {
        require_subject(&conn, &user.id, subject_id)?;
    }
    db::update_task(&conn, &user.id, &id, &updates)?;
    Ok(Json(require_task(&conn, &user.id, &id)?))
}

async fn delete_task(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let conn = state.db.lock().await;
    if !db::delete_task(&conn, &user.id, &id)? {
        return Err(AppError::NotFound("Task"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct StatusChange<S> {
    status: S,
}

async fn change_task_status(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(change): Json<StatusChange<TaskStatus>>,
) -> ApiResult<Json<Task>> {
    let conn = state.db.lock().await;
    if !db::set_task_status(&conn, &user.id, &id, change.status)? {
        return Err(AppError::NotFound("Task"));
    }
    Ok(Json(require_task(&conn, &user.id, &id)?))
}

async fn log_task_progress(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(entry): Json<TaskProgressEntry>,
) -> ApiResult<Json<Task>> {
    let today = Utc::now()
        .with_timezone(&state.config.utc_offset)
        .date_naive();
    let conn = state.db.lock().await;
    let task = completion::log_task_progress(&conn, &user.id, &id, &entry, today)?;
    Ok(Json(task))
}

// ========== Progress logs ==========

async fn list_logs(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<ProgressLog>>> {
    let conn = state.db.lock().await;
    Ok(Json(db::list_logs(&conn, &user.id, &LogFilter::default())?))
}

async fn create_log(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(new): Json<NewProgressLog>,
) -> ApiResult<(StatusCode, Json<ProgressLog>)> {
    new.validate()?;
    let conn = state.db.lock().await;
    require_subject(&conn, &user.id, &new.subject_id)?;
    if let Some(ref task_id) = new.task_id {
        require_task(&conn, &user.id, task_id)?;
    }
    let log = db::insert_log(&conn, &user.id, &new)?;
    Ok((StatusCode::CREATED, Json(log)))
}

async fn delete_log(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let conn = state.db.lock().await;
    if !db::delete_log(&conn, &user.id, &id)? {
        return Err(AppError::NotFound("Progress log"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ========== Study plans ==========

#[derive(Debug, Deserialize)]
struct PlanQuery {
    day: Option<u8>,
}

async fn list_plans(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(query): Query<PlanQuery>,
) -> ApiResult<Json<Vec<StudyPlan>>> {
    let conn = state.db.lock().await;
    Ok(Json(db::list_plans(&conn, &user.id, query.day)?))
}

/// Create a study block, either alone, assigned to an existing task, or
/// together with a new task. A new task is inserted first and the plan second,
/// as separate writes.
async fn create_plan(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(mut new): Json<NewStudyPlan>,
) -> ApiResult<(StatusCode, Json<StudyPlan>)> {
    let conn = state.db.lock().await;
    let same_day = db::list_plans(&conn, &user.id, Some(new.day_of_week))?;
    let slot = check_new_plan(&new, &same_day)?;
    require_subject(&conn, &user.id, &new.subject_id)?;

    match (new.task_id.clone(), new.new_task.take()) {
        (Some(_), Some(_)) => {
            return Err(AppError::validation(
                "Assign an existing task or create a new one, not both",
            ))
        }
        (Some(task_id), None) => {
            let task = require_task(&conn, &user.id, &task_id)?;
            new.subject_id = task.subject_id;
            new.location.get_or_insert_with(|| "Assigned Task".to_string());
            new.notes.get_or_insert_with(|| format!("Assigned task id: {task_id}"));
        }
        (None, Some(plan_task)) => {
            plan_task.validate()?;
            let title = plan_task.title.clone();
            let new_task = plan_task.into_new_task(&new.subject_id);
            let task = db::insert_task(&conn, &user.id, &new_task)?;
            info!(task = %task.id, "Created task from planner");
            audit(
                &conn,
                &user.id,
                LogType::Success,
                &format!("Task created via planner: {title}"),
            );
            new.task_id = Some(task.id);
            new.location.get_or_insert_with(|| "Created via Planner".to_string());
            new.notes.get_or_insert_with(|| format!("Task created: {title}"));
        }
        (None, None) => {}
    }

    let plan = db::insert_plan(&conn, &user.id, &new, slot)?;
    info!(plan = %plan.id, day = plan.day_of_week, "Created study plan");
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn delete_plan(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let conn = state.db.lock().await;
    if !db::delete_plan(&conn, &user.id, &id)? {
        return Err(AppError::NotFound("Study plan"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ========== Reminders ==========

/// Reconcile the account's reminders and split them for display
pub fn load_reminder_board(
    conn: &Connection,
    user_id: &str,
    profile: &Profile,
    config: &Config,
) -> anyhow::Result<ReminderBoard> {
    let now = Utc::now();
    let tasks = db::list_tasks(conn, user_id, &TaskFilter::default())?;
    let (completed, incomplete): (Vec<Task>, Vec<Task>) =
        tasks.into_iter().partition(Task::is_completed);
    let completed_ids: HashSet<String> = completed.into_iter().map(|t| t.id).collect();

    let schedule = ReminderSchedule::new(profile.reminder_time_or_default(), config.utc_offset);
    let existing = db::list_reminders(conn, user_id)?;
    let outcome = reminders::reconcile(conn, user_id, existing, &incomplete, &schedule, now);

    Ok(reminders::board(
        outcome.reminders,
        |task_id| completed_ids.contains(task_id),
        now,
    ))
}

async fn reminder_board(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> ApiResult<Json<ReminderBoard>> {
    let conn = state.db.lock().await;
    let board = load_reminder_board(&conn, &user.id, &user.profile, &state.config)?;
    Ok(Json(board))
}

/// Message for manual reminders submitted without one
const DEFAULT_REMINDER_MESSAGE: &str = "Reminder: Task due soon";

async fn create_reminder(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(mut new): Json<NewReminder>,
) -> ApiResult<(StatusCode, Json<Reminder>)> {
    let conn = state.db.lock().await;
    if let Some(ref task_id) = new.task_id {
        require_task(&conn, &user.id, task_id)?;
    }
    if new.message.as_deref().map_or(true, |m| m.trim().is_empty()) {
        new.message = Some(DEFAULT_REMINDER_MESSAGE.to_string());
    }
    let reminder = db::insert_reminders(&conn, &user.id, std::slice::from_ref(&new))?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Store(anyhow::anyhow!("Reminder insert returned no row")))?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

async fn update_reminder(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(updates): Json<ReminderUpdate>,
) -> ApiResult<Json<Reminder>> {
    let conn = state.db.lock().await;
    if let Some(ref task_id) = updates.task_id {
        require_task(&conn, &user.id, task_id)?;
    }
    db::update_reminder(&conn, &user.id, &id, &updates)?;
    let reminder =
        db::get_reminder(&conn, &user.id, &id)?.ok_or(AppError::NotFound("Reminder"))?;
    Ok(Json(reminder))
}

async fn change_reminder_status(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(change): Json<StatusChange<ReminderStatus>>,
) -> ApiResult<Json<Reminder>> {
    if change.status == ReminderStatus::Pending {
        return Err(AppError::validation("Reminder status must be sent or failed"));
    }
    let conn = state.db.lock().await;
    if !db::set_reminder_status(&conn, &user.id, &id, change.status)? {
        return Err(AppError::NotFound("Reminder"));
    }
    let reminder =
        db::get_reminder(&conn, &user.id, &id)?.ok_or(AppError::NotFound("Reminder"))?;
    Ok(Json(reminder))
}

async fn delete_reminder(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let conn = state.db.lock().await;
    if !db::delete_reminder(&conn, &user.id, &id)? {
        return Err(AppError::NotFound("Reminder"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ========== Reports ==========

#[derive(Debug, Deserialize)]
struct ReportQuery {
    range: Option<ReportRange>,
}

async fn report_handler(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<Report>> {
    let conn = state.db.lock().await;
    let range = query.range.unwrap_or_default();
    Ok(Json(reports::load(&conn, &user.id, range, Utc::now())?))
}

// ========== Profile ==========

/// Validate submitted settings before they reach the store
pub fn profile_changes(update: &ProfileUpdate) -> ApiResult<ProfileChanges> {
    let semester_length_weeks = match update.semester_length_weeks {
        Some(weeks) if (1..=52).contains(&weeks) => Some(weeks as u32),
        Some(_) => {
            return Err(AppError::validation(
                "Semester length must be between 1 and 52 weeks",
            ))
        }
        None => None,
    };
    let reminder_time = update
        .reminder_time
        .as_deref()
        .map(parse_time_of_day)
        .transpose()?;

    Ok(ProfileChanges {
        full_name: update.full_name.clone(),
        reminder_time,
        semester_length_weeks,
    })
}

async fn get_profile(user: CurrentUser) -> Json<Profile> {
    Json(user.profile)
}

async fn update_profile(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<Profile>> {
    let changes = profile_changes(&update)?;
    let conn = state.db.lock().await;
    db::update_profile(&conn, &user.id, &changes)?;
    let profile = db::get_profile(&conn, &user.id)?.ok_or(AppError::NotFound("Profile"))?;
    Ok(Json(profile))
}

// ========== Admin ==========

/// Entries shown in the overview's activity list
const RECENT_LOG_LIMIT: usize = 20;

#[derive(Debug, Serialize)]
struct AdminOverview {
    #[serde(flatten)]
    counts: SystemCounts,
    users: Vec<Profile>,
    recent_logs: Vec<SystemLog>,
}

fn require_admin(user: &CurrentUser) -> ApiResult<()> {
    if user.profile.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

async fn admin_overview(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> ApiResult<Json<AdminOverview>> {
    require_admin(&user)?;
    let conn = state.db.lock().await;
    let counts = db::system_counts(&conn, Utc::now() - Duration::days(7))?;
    let users = db::list_profiles(&conn)?;
    let recent_logs = db::recent_system_logs(&conn, RECENT_LOG_LIMIT)?;
    Ok(Json(AdminOverview {
        counts,
        users,
        recent_logs,
    }))
}

#[derive(Debug, Deserialize)]
struct RoleChange {
    role: Role,
}

async fn admin_set_role(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(change): Json<RoleChange>,
) -> ApiResult<Json<Profile>> {
    require_admin(&user)?;
    let conn = state.db.lock().await;
    if !db::set_role(&conn, &id, change.role)? {
        return Err(AppError::NotFound("User"));
    }
    info!(user = %id, role = %change.role, "Changed user role");
    audit(
        &conn,
        &user.id,
        LogType::Info,
        &format!("Role of {id} changed to {}", change.role),
    );
    let profile = db::get_profile(&conn, &id)?.ok_or(AppError::NotFound("User"))?;
    Ok(Json(profile))
}

// ========== Schedule generation ==========

const CORS_HEADERS: [(HeaderName, &str); 2] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        "authorization, x-client-info, apikey, content-type",
    ),
];

async fn generate_schedule() -> impl IntoResponse {
    (
        StatusCode::GONE,
        CORS_HEADERS,
        Json(json!({ "error": SCHEDULING_DISABLED })),
    )
}

async fn schedule_preflight() -> impl IntoResponse {
    (StatusCode::OK, CORS_HEADERS, "ok")
}
