use async_trait::async_trait;
use reel_core::{ChannelInfo, UploadsPage};

/// Read access to a video platform's channel catalog.
///
/// Implementations never fail outward: an upstream error resolves to `None`
/// or to an empty last page, and the caller moves on.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Look up a channel's title and uploads playlist.
    async fn resolve_channel(&self, channel_id: &str) -> Option<ChannelInfo>;

    /// One page of a playlist, newest first. `page_size` is clamped to the
    /// platform maximum.
    async fn list_uploads(
        &self,
        playlist_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> UploadsPage;
}
