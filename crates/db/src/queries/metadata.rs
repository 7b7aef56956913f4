//! Key/value bookkeeping written by the scheduler and read by the stats view.

use std::collections::HashMap;

use sqlx::SqlitePool;

pub const LAST_SYNC_STARTED: &str = "last_sync_started";
pub const LAST_SYNC_COMPLETED: &str = "last_sync_completed";
pub const LAST_SYNC_NEW_VIDEOS: &str = "last_sync_new_videos";
pub const INITIAL_LOAD_COMPLETED: &str = "initial_load_completed";
pub const INITIAL_VIDEOS_COUNT: &str = "initial_videos_count";

pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO metadata (key, value)
        VALUES ($1, $2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Write several entries in one transaction.
pub async fn set_many(pool: &SqlitePool, entries: &[(&str, String)]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for (key, value) in entries {
        sqlx::query(
            r#"
            INSERT INTO metadata (key, value)
            VALUES ($1, $2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(*key)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT value FROM metadata WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
}

pub async fn all(pool: &SqlitePool) -> Result<HashMap<String, String>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String)>("SELECT key, value FROM metadata")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}
