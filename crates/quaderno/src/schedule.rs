//! Client for the schedule generation endpoint.
//!
//! Generation is switched off server side: the endpoint answers 410 Gone.
//! Any non-success status is a hard failure and is never retried.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

pub const SCHEDULE_PATH: &str = "/functions/v1/generate-schedule";

pub const SCHEDULING_DISABLED: &str = "AI scheduling has been disabled on this deployment. \
     Please create and assign tasks manually via the Study Planner.";

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("schedule request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The `error` field of a JSON error body, or the raw body otherwise.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// POST a schedule request to `{base_url}/functions/v1/generate-schedule`.
pub async fn request_schedule(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    payload: &Value,
) -> Result<Value, ScheduleError> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), SCHEDULE_PATH);
    debug!(url = %url, "Requesting schedule");

    let response = client
        .post(&url)
        .bearer_auth(token)
        .json(payload)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = error_message(&body);
        error!(status = status.as_u16(), error = %message, "Schedule generation failed");
        return Err(ScheduleError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
}
