use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Renders a timestamp in the fixed-width form used for every stored column.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| sqlx::Error::Decode(format!("bad timestamp {raw:?}: {err}").into()))
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    /// `None` until the channel has been resolved against the platform.
    pub title: Option<String>,
    pub section: String,
    pub uploads_playlist_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    pub channel_id: String,
    pub channel_title: String,
    pub section: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    Offset { offset: i64, limit: i64 },
    /// Keyset pagination; `after` is the id of the last video already seen.
    Cursor { after: Option<String>, limit: i64 },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VideoPage {
    pub items: Vec<Video>,
    /// Only computed for offset pagination.
    pub total: Option<i64>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LibraryStats {
    pub video_count: i64,
    pub channel_count: i64,
    pub oldest_video: Option<DateTime<Utc>>,
    pub newest_video: Option<DateTime<Utc>>,
}
