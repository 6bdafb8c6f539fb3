//! Demo/publish surface: accepts a discriminated payload and maps it onto
//! one notification facade call.

use crate::controller::required;
use crate::error::Error;
use axum::extract::State;
use axum::Json;
use notify::Severity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service::AppState;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PublishKind {
    System,
    Progress,
    Success,
    Error,
    Update,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishPayload {
    #[serde(rename = "type")]
    pub kind: PublishKind,
    pub user_id: Option<String>,
    pub message: Option<String>,
    pub data: Option<Value>,
    pub operation_id: Option<String>,
    pub progress: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublishResponse {
    pub notified: usize,
}

/// POST one event through the notification facade
#[utoipa::path(
    post,
    path = "/publish",
    request_body = PublishPayload,
    responses(
        (status = 200, description = "Event dispatched; body carries the count of clients notified", body = PublishResponse),
        (status = 422, description = "Unknown type or missing required field")
    )
)]
pub async fn publish(
    State(app_state): State<AppState>,
    Json(payload): Json<PublishPayload>,
) -> Result<Json<PublishResponse>, Error> {
    let manager = app_state.sse_manager.as_ref();
    let message = payload.message.as_deref().unwrap_or_default();

    let notified = match payload.kind {
        PublishKind::System => notify::system_notification(
            manager,
            payload.user_id.as_deref(),
            message,
            Severity::Info,
        )?,
        PublishKind::Progress => {
            let user_id = required(payload.user_id.as_deref(), "user_id")?;
            let operation_id = required(payload.operation_id.as_deref(), "operation_id")?;
            notify::progress_update(
                manager,
                user_id,
                operation_id,
                payload.progress.unwrap_or(0),
                payload.message.as_deref(),
            )?
        }
        PublishKind::Success => {
            let user_id = required(payload.user_id.as_deref(), "user_id")?;
            notify::success_notification(manager, user_id, message, payload.data)?
        }
        PublishKind::Error => {
            let user_id = required(payload.user_id.as_deref(), "user_id")?;
            notify::error_notification(manager, user_id, message, payload.data)?
        }
        PublishKind::Update => {
            let user_ids = payload.user_id.map(|user_id| vec![user_id]);
            notify::realtime_update(
                manager,
                "publish",
                payload.data.unwrap_or(Value::Null),
                user_ids.as_deref(),
            )?
        }
    };

    Ok(Json(PublishResponse { notified }))
}
