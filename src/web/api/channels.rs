use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::history::HistoryError;
use crate::reconciler::{load_history, ChannelStatus, Ingest};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, AuthenticatedUser};
use crate::web::config::Permission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Recorded,
    Dropped,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub status: IngestStatus,
    /// Why the payload was discarded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_extended: Option<bool>,
}

impl From<&Ingest> for IngestResponse {
    fn from(ingest: &Ingest) -> Self {
        match ingest {
            Ingest::Dropped(e) => IngestResponse {
                status: IngestStatus::Dropped,
                reason: Some(e.to_string()),
                connected: None,
                track_extended: None,
            },
            Ingest::Recorded {
                track_extended,
                connected,
                ..
            } => IngestResponse {
                status: IngestStatus::Recorded,
                reason: None,
                connected: Some(*connected),
                track_extended: Some(*track_extended),
            },
        }
    }
}

/// Position events are accepted even when they are discarded; a sender has
/// nothing useful to do with a rejection.
#[utoipa::path(
    post,
    path = "/api/channels/{id}/positions",
    tag = "channels",
    params(
        ("id" = String, Path, description = "Channel ID")
    ),
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 202, description = "Position recorded or dropped", body = IngestResponse),
        (status = 401, description = "Missing or invalid API key"),
        (status = 403, description = "Insufficient permissions")
    ),
    security(("api_key" = []))
)]
pub async fn publish_position(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    body: String,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    require_permission(&user, Permission::PublishPositions)?;

    let ingest = state
        .reconciler
        .lock()
        .await
        .on_position_event(&id, &body, Utc::now());

    if let Ingest::Recorded {
        first_seen: true, ..
    } = ingest
    {
        if state.config.history.autoload {
            spawn_autoload(&state, id);
        }
    }

    Ok((StatusCode::ACCEPTED, Json(IngestResponse::from(&ingest))))
}

fn spawn_autoload(state: &AppState, channel_id: String) {
    let history = state.history.clone();
    let reconciler = state.reconciler.clone();
    tokio::spawn(async move {
        match load_history(history.as_ref(), &reconciler, &channel_id).await {
            Ok(count) => log::info!("Autoloaded {} samples for {}", count, channel_id),
            Err(HistoryError::NotFound(_)) => log::debug!("No history for {}", channel_id),
            Err(e) => log::warn!("Autoload for {} failed: {}", channel_id, e),
        }
    });
}

#[utoipa::path(
    get,
    path = "/api/channels",
    tag = "channels",
    responses(
        (status = 200, description = "All known channels in first-seen order", body = Vec<ChannelStatus>)
    )
)]
pub async fn list_channels(State(state): State<AppState>) -> Json<Vec<ChannelStatus>> {
    Json(state.reconciler.lock().await.snapshot(Utc::now()))
}

#[utoipa::path(
    get,
    path = "/api/channels/{id}",
    tag = "channels",
    params(
        ("id" = String, Path, description = "Channel ID")
    ),
    responses(
        (status = 200, description = "Channel state", body = ChannelStatus),
        (status = 404, description = "Channel not found", body = ErrorResponse)
    )
)]
pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChannelStatus>> {
    state
        .reconciler
        .lock()
        .await
        .channel(&id, Utc::now())
        .map(Json)
        .ok_or(ApiError::NotFound("channel_not_found"))
}
