//! Video database operations.
//!
//! Videos are keyed by their platform id and ordered by publish time, newest
//! first, with the id as tie-breaker. That `(published_at, id)` pair is also
//! the keyset used by cursor pagination.

use crate::models::{format_timestamp, parse_timestamp, LibraryStats, Pagination, Video, VideoPage};
use crate::QueryError;
use chrono::{DateTime, Utc};
use reel_core::VideoRecord;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const VIDEO_COLUMNS: &str = "id, title, description, thumbnail_url, channel_id, channel_title, \
                             section, published_at, fetched_at";

/// Position of a video in the listing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorBoundary {
    pub id: String,
    pub published_at: String,
}

/// Insert new videos and refresh the mutable fields of known ones.
///
/// The whole batch commits atomically. `fetched_at` records the first
/// ingestion and is never rewritten, so replaying a batch is idempotent.
pub async fn upsert_many(
    pool: &SqlitePool,
    records: &[VideoRecord],
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }

    let fetched_at = format_timestamp(now);
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for record in records {
        let result = sqlx::query(
            r#"
            INSERT INTO videos
                (id, title, description, thumbnail_url, channel_id, channel_title,
                 section, published_at, fetched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT(id) DO UPDATE
                SET title = excluded.title,
                    description = excluded.description,
                    thumbnail_url = excluded.thumbnail_url,
                    channel_title = excluded.channel_title,
                    section = excluded.section,
                    published_at = excluded.published_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.thumbnail_url)
        .bind(&record.channel_id)
        .bind(&record.channel_title)
        .bind(&record.section)
        .bind(format_timestamp(record.published_at))
        .bind(&fetched_at)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// High-water mark for a channel: its newest stored publish time.
pub async fn latest_published_at(
    pool: &SqlitePool,
    channel_id: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let latest = sqlx::query_scalar::<_, Option<String>>(
        r#"
        SELECT MAX(published_at)
        FROM videos
        WHERE channel_id = $1
        "#,
    )
    .bind(channel_id)
    .fetch_one(pool)
    .await?;

    latest.as_deref().map(parse_timestamp).transpose()
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Video>, sqlx::Error> {
    let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1");
    sqlx::query_as::<_, Video>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn count(pool: &SqlitePool, section: Option<&str>) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM videos");
    if let Some(section) = section {
        qb.push(" WHERE section = ").push_bind(section);
    }
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

pub async fn count_for_channel(pool: &SqlitePool, channel_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM videos WHERE channel_id = $1")
        .bind(channel_id)
        .fetch_one(pool)
        .await
}

/// Resolve a cursor (a video id) to its position in the listing order.
pub async fn cursor_boundary(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<CursorBoundary>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT id, published_at
        FROM videos
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id, published_at)| CursorBoundary { id, published_at }))
}

/// Videos strictly after `boundary` in listing order.
pub async fn list_after(
    pool: &SqlitePool,
    section: Option<&str>,
    boundary: Option<&CursorBoundary>,
    limit: i64,
) -> Result<Vec<Video>, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE 1 = 1"));
    if let Some(section) = section {
        qb.push(" AND section = ").push_bind(section);
    }
    if let Some(boundary) = boundary {
        qb.push(" AND (published_at < ")
            .push_bind(boundary.published_at.as_str())
            .push(" OR (published_at = ")
            .push_bind(boundary.published_at.as_str())
            .push(" AND id < ")
            .push_bind(boundary.id.as_str())
            .push("))");
    }
    qb.push(" ORDER BY published_at DESC, id DESC LIMIT ")
        .push_bind(limit);

    qb.build_query_as::<Video>().fetch_all(pool).await
}

pub async fn list_offset(
    pool: &SqlitePool,
    section: Option<&str>,
    offset: i64,
    limit: i64,
) -> Result<Vec<Video>, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {VIDEO_COLUMNS} FROM videos"));
    if let Some(section) = section {
        qb.push(" WHERE section = ").push_bind(section);
    }
    qb.push(" ORDER BY published_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as::<Video>().fetch_all(pool).await
}

/// One page of the video listing, optionally restricted to a section.
///
/// Offset pages report the total count. Cursor pages fetch one extra row to
/// learn whether more remain; an unknown cursor id is an error.
pub async fn query(
    pool: &SqlitePool,
    section: Option<&str>,
    pagination: &Pagination,
) -> Result<VideoPage, QueryError> {
    match pagination {
        Pagination::Offset { offset, limit } => {
            let offset = (*offset).max(0);
            let limit = (*limit).max(1);
            let total = count(pool, section).await?;
            let items = list_offset(pool, section, offset, limit).await?;
            let has_more = offset + (items.len() as i64) < total;
            let next_cursor = if has_more {
                items.last().map(|video| video.id.clone())
            } else {
                None
            };

            Ok(VideoPage {
                items,
                total: Some(total),
                has_more,
                next_cursor,
            })
        }
        Pagination::Cursor { after, limit } => {
            let limit = (*limit).max(1);
            let boundary = match after.as_deref() {
                Some(id) => Some(
                    cursor_boundary(pool, id)
                        .await?
                        .ok_or_else(|| QueryError::InvalidCursor(id.to_string()))?,
                ),
                None => None,
            };

            let mut items = list_after(pool, section, boundary.as_ref(), limit + 1).await?;
            let has_more = items.len() as i64 > limit;
            items.truncate(limit as usize);
            let next_cursor = if has_more {
                items.last().map(|video| video.id.clone())
            } else {
                None
            };

            Ok(VideoPage {
                items,
                total: None,
                has_more,
                next_cursor,
            })
        }
    }
}

pub async fn library_stats(pool: &SqlitePool) -> Result<LibraryStats, sqlx::Error> {
    let (video_count, channel_count, oldest, newest) =
        sqlx::query_as::<_, (i64, i64, Option<String>, Option<String>)>(
            r#"
            SELECT COUNT(*), COUNT(DISTINCT channel_id), MIN(published_at), MAX(published_at)
            FROM videos
            "#,
        )
        .fetch_one(pool)
        .await?;

    Ok(LibraryStats {
        video_count,
        channel_count,
        oldest_video: oldest.as_deref().map(parse_timestamp).transpose()?,
        newest_video: newest.as_deref().map(parse_timestamp).transpose()?,
    })
}
