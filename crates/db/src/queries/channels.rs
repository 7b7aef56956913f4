//! Channel database operations.
//!
//! Channels enter the table from the configured channel list or through an
//! explicit add; nothing in the sync path ever deletes them or changes their
//! section.

use crate::models::{format_timestamp, Channel};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Insert a configured channel, or update the section of a known one.
///
/// Title and uploads handle are left untouched so a cached resolution
/// survives restarts.
pub async fn upsert_configured(
    pool: &SqlitePool,
    id: &str,
    section: &str,
    now: DateTime<Utc>,
) -> Result<Channel, sqlx::Error> {
    let now = format_timestamp(now);
    sqlx::query_as::<_, Channel>(
        r#"
        INSERT INTO channels (id, section, created_at, updated_at)
        VALUES ($1, $2, $3, $3)
        ON CONFLICT(id) DO UPDATE
            SET section = excluded.section,
                updated_at = CASE
                    WHEN channels.section = excluded.section THEN channels.updated_at
                    ELSE excluded.updated_at
                END
        RETURNING id, title, section, uploads_playlist_id, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(section)
    .bind(&now)
    .fetch_one(pool)
    .await
}

/// Insert an already-resolved channel. Returns `false` when the id was
/// already tracked, in which case the existing row is left unchanged.
pub async fn create_resolved(
    pool: &SqlitePool,
    id: &str,
    title: &str,
    section: &str,
    uploads_playlist_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let now = format_timestamp(now);
    let result = sqlx::query(
        r#"
        INSERT INTO channels (id, title, section, uploads_playlist_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(section)
    .bind(uploads_playlist_id)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Channel>, sqlx::Error> {
    sqlx::query_as::<_, Channel>(
        r#"
        SELECT id, title, section, uploads_playlist_id, created_at, updated_at
        FROM channels
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<Channel>, sqlx::Error> {
    sqlx::query_as::<_, Channel>(
        r#"
        SELECT id, title, section, uploads_playlist_id, created_at, updated_at
        FROM channels
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Distinct section labels across tracked channels, sorted.
pub async fn list_sections(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT section
        FROM channels
        ORDER BY section
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Cache the platform title and uploads handle after a successful lookup.
pub async fn record_resolution(
    pool: &SqlitePool,
    id: &str,
    title: &str,
    uploads_playlist_id: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE channels
        SET title = $1,
            uploads_playlist_id = $2,
            updated_at = $3
        WHERE id = $4
        "#,
    )
    .bind(title)
    .bind(uploads_playlist_id)
    .bind(format_timestamp(now))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
