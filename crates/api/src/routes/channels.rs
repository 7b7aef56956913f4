use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use reel_db::models::Channel;
use reel_worker::{SyncMode, SyncPermit};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{ApiResult, AppError},
    state::{AppState, RequestId},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/channels", get(list_channels).post(add_channel))
        .route("/api/channels/{id}/refresh", post(refresh_channel))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AddChannelRequest {
    id: String,
    section: String,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshQuery {
    #[serde(default)]
    full: bool,
}

#[derive(Debug, Serialize)]
struct ChannelListResponse {
    channels: Vec<Channel>,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    status: &'static str,
    channel_id: String,
    full: bool,
}

async fn list_channels(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Json<ChannelListResponse>> {
    let channels = reel_db::queries::channels::list(&state.db)
        .await
        .map_err(|_| AppError::Internal.with_request_id(&request_id.0))?;

    Ok(Json(ChannelListResponse { channels }))
}

/// Track a new channel and backfill it in the background. Adding a channel
/// that is already tracked returns it unchanged.
async fn add_channel(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(payload): Json<AddChannelRequest>,
) -> ApiResult<(StatusCode, Json<Channel>)> {
    let id = payload.id.trim();
    let section = payload.section.trim();
    if id.is_empty() || section.is_empty() {
        return Err(
            AppError::BadRequest("id and section required".to_string())
                .with_request_id(&request_id.0),
        );
    }

    let (channel, created) = state
        .engine
        .add_channel(id, section)
        .await
        .map_err(|e| AppError::from(e).with_request_id(&request_id.0))?;

    if !created {
        return Ok((StatusCode::OK, Json(channel)));
    }

    match state.engine.try_begin(&channel.id) {
        Ok(permit) => spawn_sync(&state, permit, SyncMode::Backfill),
        Err(e) => warn!(channel_id = %channel.id, error = %e, "initial backfill not started"),
    }
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn refresh_channel(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<(StatusCode, Json<RefreshResponse>)> {
    reel_db::queries::channels::get_by_id(&state.db, &id)
        .await
        .map_err(|_| AppError::Internal.with_request_id(&request_id.0))?
        .ok_or_else(|| {
            AppError::NotFound("channel not found".to_string()).with_request_id(&request_id.0)
        })?;

    // Claimed before responding so two racing refreshes cannot both get 202.
    let permit = state
        .engine
        .try_begin(&id)
        .map_err(|e| AppError::from(e).with_request_id(&request_id.0))?;

    let mode = if query.full {
        SyncMode::Backfill
    } else {
        SyncMode::Auto
    };
    spawn_sync(&state, permit, mode);

    Ok((
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            status: "refresh started",
            channel_id: id,
            full: query.full,
        }),
    ))
}

fn spawn_sync(state: &AppState, permit: SyncPermit, mode: SyncMode) {
    let engine = state.engine.clone();
    let cancel = state.shutdown.child_token();
    let channel_id = permit.channel_id().to_string();
    tokio::spawn(async move {
        match engine.sync_with_permit(permit, mode, &cancel).await {
            Ok(report) => info!(
                channel_id = %report.channel_id,
                added = report.added,
                "background sync finished"
            ),
            Err(e) => warn!(channel_id = %channel_id, error = %e, "background sync failed"),
        }
    });
}
