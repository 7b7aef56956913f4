use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pseudo-section that matches every video.
pub const ALL_SECTIONS: &str = "all";

/// Returns `None` when the filter selects every section.
pub fn section_filter(section: Option<&str>) -> Option<&str> {
    match section.map(str::trim) {
        None | Some("") => None,
        Some(value) if value.eq_ignore_ascii_case(ALL_SECTIONS) => None,
        Some(value) => Some(value),
    }
}

/// One entry of the tracked-channel list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel_id: String,
    pub section: String,
}

/// Channel details resolved from the video platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub title: String,
    pub uploads_playlist_id: String,
}

/// A video as returned by the platform, ready to be written to the store.
///
/// `section` is empty when the record comes straight from the source client;
/// the sync engine stamps the owning channel's section before the upsert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    pub channel_id: String,
    pub channel_title: String,
    pub section: String,
    pub published_at: DateTime<Utc>,
}

/// One page of a channel's uploads, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadsPage {
    pub items: Vec<VideoRecord>,
    pub next_page_token: Option<String>,
}

impl UploadsPage {
    pub fn empty() -> Self {
        Self::default()
    }
}
