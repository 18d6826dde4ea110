use chrono::{DateTime, FixedOffset, Utc};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::collections::HashMap;

use crate::dashboard::Dashboard;
use crate::progress::TaskWithProgress;
use crate::types::{Profile, StudyPlan, Subject};

/// Render the dashboard page
pub fn render_page(
    profile: &Profile,
    dashboard: &Dashboard,
    subjects: &[Subject],
    offset: FixedOffset,
) -> Markup {
    let by_id: HashMap<&str, &Subject> = subjects.iter().map(|s| (s.id.as_str(), s)).collect();
    let stats = &dashboard.stats;

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Quaderno" }
                style { (PreEscaped(CSS)) }
            }
            body {
                div.container {
                    h1 { "Quaderno" }
                    p.greeting {
                        "Welcome back"
                        @if let Some(ref name) = profile.full_name {
                            ", " (name)
                        }
                    }
                    div.stats {
                        (stat("Subjects", stats.total_subjects))
                        (stat("Tasks", stats.total_tasks))
                        (stat("Completed", stats.completed_tasks))
                        (stat("Due this week", stats.upcoming_tasks))
                    }

                    section {
                        h2 { "To do" }
                        @if dashboard.todo.is_empty() {
                            div.empty-state { p { "Nothing left to do. Nice work." } }
                        } @else {
                            @for item in &dashboard.todo {
                                (render_task(item, by_id.get(item.task.subject_id.as_str()).copied(), offset))
                            }
                        }
                    }

                    section {
                        h2 { "Due in the next 24 hours" }
                        @if dashboard.due_soon.is_empty() {
                            div.empty-state { p { "No tasks due soon." } }
                        } @else {
                            @for item in &dashboard.due_soon {
                                (render_task(item, by_id.get(item.task.subject_id.as_str()).copied(), offset))
                            }
                        }
                    }

                    section {
                        h2 { "Today's study plan" }
                        @if dashboard.today_plans.is_empty() {
                            div.empty-state { p { "No study blocks scheduled for today." } }
                        } @else {
                            @for plan in &dashboard.today_plans {
                                (render_plan(plan, by_id.get(plan.subject_id.as_str()).copied()))
                            }
                        }
                    }
                }
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    }
}

fn stat(label: &str, value: usize) -> Markup {
    html! {
        div.stat {
            span.stat-value { (value) }
            span.stat-label { (label) }
        }
    }
}

fn format_due(due: Option<DateTime<Utc>>, offset: FixedOffset) -> String {
    match due {
        Some(due) => due.with_timezone(&offset).format("%a %d %b, %H:%M").to_string(),
        None => "No due date".to_string(),
    }
}

fn render_task(item: &TaskWithProgress, subject: Option<&Subject>, offset: FixedOffset) -> Markup {
    let task = &item.task;
    let progress = &item.progress;
    let color = subject.map(|s| s.color.as_str()).unwrap_or("#3B82F6");

    html! {
        div.task-item data-task-id=(task.id) style={ "border-left-color: " (color) } {
            input.task-checkbox type="checkbox" data-task-id=(task.id);
            div.task-content {
                div.task-subject {
                    @if let Some(subject) = subject {
                        (subject.name)
                    }
                    span.task-type { (task.task_type) }
                    span class={ "priority " (task.priority) } { (task.priority) }
                }
                div.task-title { (task.title) }
                div.task-meta {
                    (format_due(task.due_date, offset))
                    " · "
                    (progress.remaining_hours) "h left"
                }
                div.progress-bar {
                    div.progress-fill style={ "width: " (progress.progress_percent) "%" } {}
                }
            }
        }
    }
}

fn render_plan(plan: &StudyPlan, subject: Option<&Subject>) -> Markup {
    html! {
        div.plan-item {
            span.plan-time {
                (plan.start_time.format("%H:%M")) " - " (plan.end_time.format("%H:%M"))
            }
            span.plan-subject {
                @if let Some(subject) = subject {
                    (subject.name)
                }
            }
            @if let Some(ref location) = plan.location {
                span.plan-location { (location) }
            }
        }
    }
}

const CSS: &str = r#"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
    background: #f5f5f4;
    color: #1c1917;
    min-height: 100vh;
    line-height: 1.5;
}

.container {
    max-width: 880px;
    margin: 0 auto;
    padding: 40px 24px 60px;
}

h1 {
    font-weight: 800;
    font-size: 2.6em;
    letter-spacing: -0.02em;
}

h2 {
    font-size: 1.1em;
    font-weight: 700;
    margin: 36px 0 14px;
    text-transform: uppercase;
    letter-spacing: 0.08em;
    color: #57534e;
}

.greeting {
    color: #78716c;
    margin-bottom: 24px;
}

.stats {
    display: grid;
    grid-template-columns: repeat(4, 1fr);
    gap: 12px;
}

.stat {
    background: #fff;
    border: 1px solid #e7e5e4;
    border-radius: 10px;
    padding: 16px;
    display: flex;
    flex-direction: column;
}

.stat-value {
    font-size: 1.8em;
    font-weight: 800;
}

.stat-label {
    color: #78716c;
    font-size: 0.8em;
    text-transform: uppercase;
    letter-spacing: 0.06em;
}

.task-item {
    display: flex;
    gap: 16px;
    padding: 16px;
    margin-bottom: 10px;
    background: #fff;
    border: 1px solid #e7e5e4;
    border-left: 4px solid #3B82F6;
    border-radius: 8px;
    transition: opacity 0.2s;
}

.task-item.completed {
    opacity: 0.4;
}

.task-item.completed .task-title {
    text-decoration: line-through;
}

.task-checkbox {
    width: 20px;
    height: 20px;
    min-width: 20px;
    margin-top: 3px;
    cursor: pointer;
}

.task-content {
    flex: 1;
}

.task-subject {
    font-size: 0.85em;
    font-weight: 700;
    color: #57534e;
    display: flex;
    gap: 8px;
    align-items: center;
}

.task-type, .priority {
    font-size: 0.8em;
    padding: 1px 8px;
    border-radius: 999px;
    background: #f5f5f4;
    text-transform: uppercase;
}

.priority.high { background: #fee2e2; color: #b91c1c; }
.priority.medium { background: #fef3c7; color: #b45309; }
.priority.low { background: #dcfce7; color: #15803d; }

.task-title {
    font-weight: 600;
    margin-top: 2px;
}

.task-meta {
    color: #78716c;
    font-size: 0.85em;
}

.progress-bar {
    height: 6px;
    margin-top: 8px;
    background: #e7e5e4;
    border-radius: 3px;
    overflow: hidden;
}

.progress-fill {
    height: 100%;
    background: #3B82F6;
}

.plan-item {
    display: flex;
    gap: 16px;
    padding: 12px 16px;
    margin-bottom: 8px;
    background: #fff;
    border: 1px solid #e7e5e4;
    border-radius: 8px;
}

.plan-time {
    font-weight: 700;
    font-variant-numeric: tabular-nums;
}

.plan-location {
    color: #78716c;
    margin-left: auto;
}

.empty-state {
    padding: 24px;
    text-align: center;
    color: #a8a29e;
    font-size: 0.9em;
}

@media (max-width: 640px) {
    .stats {
        grid-template-columns: repeat(2, 1fr);
    }
}
"#;

const JAVASCRIPT: &str = r#"
// Checking a task marks it completed on the server
document.querySelectorAll('.task-checkbox').forEach(checkbox => {
    checkbox.addEventListener('change', async function() {
        const taskId = this.getAttribute('data-task-id');
        const status = this.checked ? 'completed' : 'pending';
        const response = await fetch(`/api/tasks/${taskId}/status`, {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify({ status }),
        });

        if (!response.ok) {
            this.checked = !this.checked;
            const body = await response.json().catch(() => ({}));
            alert(body.error || 'Failed to update task');
            return;
        }

        document.querySelectorAll(`.task-item[data-task-id="${taskId}"]`).forEach(item => {
            item.classList.toggle('completed', this.checked);
        });
    });
});
"#;
