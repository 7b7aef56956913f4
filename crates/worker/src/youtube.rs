//! YouTube Data API client.
//!
//! Two read-only calls are used: `channels.list` to resolve a channel's
//! uploads playlist, and `playlistItems.list` to page through it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reel_core::config::MAX_PAGE_SIZE;
use reel_core::{ChannelInfo, UploadsPage, VideoRecord};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::source::VideoSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum YouTubeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("youtube returned {status}: {body}")]
    Status { status: u16, body: String },
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    snippet: ChannelSnippet,
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    snippet: PlaylistSnippet,
    content_details: Option<PlaylistContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    channel_title: String,
    published_at: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistContentDetails {
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Thumbnails {
    pub default: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

impl Thumbnails {
    /// Highest available of high, medium, default; empty when none exist.
    pub fn best_url(&self) -> String {
        [&self.high, &self.medium, &self.default]
            .into_iter()
            .flatten()
            .map(|thumb| thumb.url.as_str())
            .find(|url| !url.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

impl PlaylistItem {
    fn into_record(self) -> Option<VideoRecord> {
        let id = self.content_details.and_then(|details| details.video_id)?;
        let published_at = self
            .snippet
            .published_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc));
        let Some(published_at) = published_at else {
            debug!(video_id = %id, "skipping playlist item without a usable publish time");
            return None;
        };

        Some(VideoRecord {
            thumbnail_url: self.snippet.thumbnails.best_url(),
            id,
            title: self.snippet.title,
            description: self.snippet.description,
            channel_id: self.snippet.channel_id,
            channel_title: self.snippet.channel_title,
            section: String::new(),
            published_at,
        })
    }
}

// ============================================================================
// YouTubeClient
// ============================================================================

pub struct YouTubeClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, YouTubeError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(http, api_key, base_url))
    }

    pub fn with_client(
        http: Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, YouTubeError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(YouTubeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }

    /// Look up a channel. `Ok(None)` means the platform does not know the id.
    pub async fn fetch_channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, YouTubeError> {
        let response: ChannelListResponse = self
            .get(
                "channels",
                &[("part", "snippet,contentDetails"), ("id", channel_id)],
            )
            .await?;

        Ok(response.items.into_iter().next().map(|item| ChannelInfo {
            id: channel_id.to_string(),
            title: item.snippet.title,
            uploads_playlist_id: item.content_details.related_playlists.uploads,
        }))
    }

    /// One page of a playlist. Items without a video id or a parseable
    /// publish time are dropped.
    pub async fn fetch_uploads_page(
        &self,
        playlist_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<UploadsPage, YouTubeError> {
        let max_results = page_size.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut query = vec![
            ("part", "snippet,contentDetails"),
            ("playlistId", playlist_id),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response: PlaylistItemsResponse = self.get("playlistItems", &query).await?;

        Ok(UploadsPage {
            items: response
                .items
                .into_iter()
                .filter_map(PlaylistItem::into_record)
                .collect(),
            next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
        })
    }
}

#[async_trait]
impl VideoSource for YouTubeClient {
    async fn resolve_channel(&self, channel_id: &str) -> Option<ChannelInfo> {
        match self.fetch_channel(channel_id).await {
            Ok(Some(info)) => Some(info),
            Ok(None) => {
                warn!(channel_id, "channel not found on youtube");
                None
            }
            Err(e) => {
                warn!(channel_id, error = %e, "youtube channel lookup failed");
                None
            }
        }
    }

    async fn list_uploads(
        &self,
        playlist_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> UploadsPage {
        match self.fetch_uploads_page(playlist_id, page_size, page_token).await {
            Ok(page) => page,
            Err(e) => {
                warn!(playlist_id, error = %e, "youtube playlist page failed");
                UploadsPage::empty()
            }
        }
    }
}
