//! Controller for handling webhooks from external job processors.
//!
//! A thin caller: each recognized event maps onto one notification facade
//! call; everything else is acknowledged and ignored.

use crate::controller::required;
use crate::error::Error;
use axum::extract::State;
use axum::Json;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service::AppState;
use utoipa::ToSchema;

/// Job processor webhook payload
#[derive(Debug, Deserialize, ToSchema)]
pub struct JobWebhookPayload {
    /// The type of event (`job.progress`, `job.completed`, `job.failed`)
    pub event: String,
    /// The job this event is for
    pub job_id: String,
    /// Logical owner to notify
    pub user_id: Option<String>,
    /// Completion percentage (progress events)
    pub progress: Option<i64>,
    /// Human-readable status line
    pub message: Option<String>,
    /// Job output (completion events)
    pub output: Option<Value>,
}

/// Response for webhook acknowledgment
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResponse {
    pub status: String,
}

/// POST a job status change
#[utoipa::path(
    post,
    path = "/webhook/jobs",
    request_body = JobWebhookPayload,
    responses(
        (status = 200, description = "Webhook processed or ignored", body = WebhookResponse),
        (status = 422, description = "Missing required field for the event type")
    )
)]
pub async fn job_status(
    State(app_state): State<AppState>,
    Json(payload): Json<JobWebhookPayload>,
) -> Result<Json<WebhookResponse>, Error> {
    let manager = app_state.sse_manager.as_ref();

    match payload.event.as_str() {
        "job.progress" => {
            let user_id = required(payload.user_id.as_deref(), "user_id")?;
            notify::progress_update(
                manager,
                user_id,
                &payload.job_id,
                payload.progress.unwrap_or(0),
                payload.message.as_deref(),
            )?;
        }
        "job.completed" => {
            let user_id = required(payload.user_id.as_deref(), "user_id")?;
            let message = payload
                .message
                .clone()
                .unwrap_or_else(|| format!("Job {} completed", payload.job_id));
            notify::success_notification(manager, user_id, &message, payload.output)?;
        }
        "job.failed" => {
            let user_id = required(payload.user_id.as_deref(), "user_id")?;
            let message = payload
                .message
                .clone()
                .unwrap_or_else(|| format!("Job {} failed", payload.job_id));
            notify::error_notification(manager, user_id, &message, payload.output)?;
        }
        other => {
            debug!("Ignoring unhandled job webhook event: {other}");
            return Ok(Json(WebhookResponse {
                status: "ignored".to_string(),
            }));
        }
    }

    Ok(Json(WebhookResponse {
        status: "ok".to_string(),
    }))
}
