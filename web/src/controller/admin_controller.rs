//! Administrative read-only projections of the dispatcher.

use axum::extract::State;
use axum::Json;
use service::AppState;
use sse::message::{ConnectionSummary, Stats};

/// GET registry statistics, computed live on every call
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Current dispatcher statistics")
    )
)]
pub async fn stats(State(app_state): State<AppState>) -> Json<Stats> {
    Json(app_state.sse_manager.stats())
}

/// GET summaries of every live connection, newest first
#[utoipa::path(
    get,
    path = "/connections",
    responses(
        (status = 200, description = "Active connection summaries, newest first")
    )
)]
pub async fn connections(State(app_state): State<AppState>) -> Json<Vec<ConnectionSummary>> {
    Json(app_state.sse_manager.active_connections())
}
