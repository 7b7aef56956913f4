use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use reel_core::section_filter;
use reel_db::models::{Pagination, Video};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiResult, AppError},
    state::{AppState, RequestId},
};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/videos", get(list_videos))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct VideoListQuery {
    section: Option<String>,
    offset: Option<i64>,
    limit: Option<i64>,
    /// Present (even empty) selects cursor pagination.
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct VideoListResponse {
    videos: Vec<Video>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<i64>,
    has_more: bool,
    next_cursor: Option<String>,
}

fn pagination(query: &VideoListQuery) -> Result<Pagination, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }

    if let Some(cursor) = query.cursor.as_deref() {
        if query.offset.is_some() {
            return Err(AppError::BadRequest(
                "offset and cursor cannot be combined".to_string(),
            ));
        }
        let after = Some(cursor.trim()).filter(|c| !c.is_empty()).map(str::to_string);
        return Ok(Pagination::Cursor { after, limit });
    }

    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(AppError::BadRequest("offset must not be negative".to_string()));
    }
    Ok(Pagination::Offset { offset, limit })
}

async fn list_videos(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<VideoListQuery>,
) -> ApiResult<Json<VideoListResponse>> {
    let pagination = pagination(&query).map_err(|e| e.with_request_id(&request_id.0))?;
    let section = section_filter(query.section.as_deref());

    let page = reel_db::queries::videos::query(&state.db, section, &pagination)
        .await
        .map_err(|e| AppError::from(e).with_request_id(&request_id.0))?;

    Ok(Json(VideoListResponse {
        videos: page.items,
        total: page.total,
        has_more: page.has_more,
        next_cursor: page.next_cursor,
    }))
}
