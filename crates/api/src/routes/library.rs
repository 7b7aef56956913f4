use axum::{extract::State, routing::get, Extension, Json, Router};
use chrono::{DateTime, Utc};
use reel_core::ALL_SECTIONS;
use reel_db::queries::{channels, metadata, videos};
use serde::Serialize;

use crate::{
    error::{ApiResult, AppError},
    state::{AppState, RequestId},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sections", get(list_sections))
        .route("/api/stats", get(stats))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct SectionsResponse {
    sections: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    video_count: i64,
    channel_count: i64,
    oldest_video: Option<DateTime<Utc>>,
    newest_video: Option<DateTime<Utc>>,
    last_update: Option<String>,
    last_update_new_videos: i64,
    initial_load_complete: Option<String>,
    initial_videos_loaded: i64,
}

async fn list_sections(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Json<SectionsResponse>> {
    let stored = channels::list_sections(&state.db)
        .await
        .map_err(|_| AppError::Internal.with_request_id(&request_id.0))?;

    let mut sections = Vec::with_capacity(stored.len() + 1);
    sections.push(ALL_SECTIONS.to_string());
    sections.extend(stored.into_iter().filter(|s| s != ALL_SECTIONS));
    Ok(Json(SectionsResponse { sections }))
}

async fn stats(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Json<StatsResponse>> {
    let library = videos::library_stats(&state.db)
        .await
        .map_err(|_| AppError::Internal.with_request_id(&request_id.0))?;
    let mut meta = metadata::all(&state.db)
        .await
        .map_err(|_| AppError::Internal.with_request_id(&request_id.0))?;

    let count = |value: Option<String>| {
        value
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or_default()
    };

    Ok(Json(StatsResponse {
        video_count: library.video_count,
        channel_count: library.channel_count,
        oldest_video: library.oldest_video,
        newest_video: library.newest_video,
        last_update: meta.remove(metadata::LAST_SYNC_COMPLETED),
        last_update_new_videos: count(meta.remove(metadata::LAST_SYNC_NEW_VIDEOS)),
        initial_load_complete: meta.remove(metadata::INITIAL_LOAD_COMPLETED),
        initial_videos_loaded: count(meta.remove(metadata::INITIAL_VIDEOS_COUNT)),
    }))
}
