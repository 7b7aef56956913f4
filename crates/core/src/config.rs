use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::types::ChannelConfig;

/// Maximum page size accepted by the YouTube Data API for list calls.
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("failed to read channel list {path}: {source}")]
    ChannelsRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse channel list {path}: {source}")]
    ChannelsParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("channel list entry {index} has an empty channel_id or section")]
    ChannelsEntry { index: usize },
}

/// Knobs that shape a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub interval: Duration,
    /// Run a backfill pass over every channel at startup when the store is empty.
    pub backfill_on_start: bool,
    /// Cap on videos fetched per channel during a backfill; `None` fetches the full history.
    pub backfill_limit: Option<usize>,
    pub page_size: u32,
    pub page_delay: Duration,
    pub channel_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1800),
            backfill_on_start: true,
            backfill_limit: None,
            page_size: MAX_PAGE_SIZE,
            page_delay: Duration::from_millis(500),
            channel_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub youtube_api_key: String,
    pub youtube_base_url: String,
    pub reel_env: String,
    pub api_bind: String,
    pub channels_file: PathBuf,
    pub scheduler_enabled: bool,
    pub sync: SyncSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .or_else(|| lookup("REEL_DATABASE_URL"))
            .unwrap_or_else(|| "sqlite://videos.db".to_string());
        let youtube_api_key = lookup("YOUTUBE_API_KEY")
            .or_else(|| lookup("REEL_YOUTUBE_API_KEY"))
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("YOUTUBE_API_KEY"))?;
        let youtube_base_url = lookup("REEL_YOUTUBE_BASE_URL")
            .unwrap_or_else(|| "https://www.googleapis.com/youtube/v3".to_string());
        let reel_env = lookup("REEL_ENV").unwrap_or_else(|| "dev".to_string());
        let api_bind = lookup("REEL_API_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let channels_file = lookup("REEL_CHANNELS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("channels.json"));
        let scheduler_enabled = parse_or(&lookup, "REEL_SCHEDULER_ENABLED", true)?;

        let defaults = SyncSettings::default();
        let interval_secs: u64 = parse_or(
            &lookup,
            "REEL_SYNC_INTERVAL_SECS",
            defaults.interval.as_secs(),
        )?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "REEL_SYNC_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        let backfill_on_start = parse_or(&lookup, "REEL_BACKFILL_ON_START", true)?;
        let backfill_all = parse_or(&lookup, "REEL_BACKFILL_ALL", true)?;
        let backfill_limit: usize = parse_or(&lookup, "REEL_BACKFILL_LIMIT", 20)?;
        if !backfill_all && backfill_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "REEL_BACKFILL_LIMIT",
                value: "0".to_string(),
            });
        }
        let page_size: u32 = parse_or(&lookup, "REEL_PAGE_SIZE", MAX_PAGE_SIZE)?;
        let page_delay_ms: u64 = parse_or(&lookup, "REEL_PAGE_DELAY_MS", 500)?;
        let channel_delay_ms: u64 = parse_or(&lookup, "REEL_CHANNEL_DELAY_MS", 1000)?;

        Ok(Self {
            database_url,
            youtube_api_key,
            youtube_base_url,
            reel_env,
            api_bind,
            channels_file,
            scheduler_enabled,
            sync: SyncSettings {
                interval: Duration::from_secs(interval_secs),
                backfill_on_start,
                backfill_limit: (!backfill_all).then_some(backfill_limit),
                page_size: page_size.clamp(1, MAX_PAGE_SIZE),
                page_delay: Duration::from_millis(page_delay_ms),
                channel_delay: Duration::from_millis(channel_delay_ms),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value })
        }
        _ => Ok(default),
    }
}

/// Loads the tracked-channel list from a JSON array of `{channel_id, section}`.
///
/// A missing file yields an empty list. When a channel id appears twice the
/// later entry wins.
pub fn load_channels(path: &Path) -> Result<Vec<ChannelConfig>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "channel list not found, tracking no configured channels");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ConfigError::ChannelsRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    parse_channels(&raw).map_err(|err| match err {
        ParseChannelsError::Json(source) => ConfigError::ChannelsParse {
            path: path.to_path_buf(),
            source,
        },
        ParseChannelsError::Entry(index) => ConfigError::ChannelsEntry { index },
    })
}

enum ParseChannelsError {
    Json(serde_json::Error),
    Entry(usize),
}

#[derive(Deserialize)]
struct RawChannel {
    channel_id: String,
    section: String,
}

fn parse_channels(raw: &str) -> Result<Vec<ChannelConfig>, ParseChannelsError> {
    let entries: Vec<RawChannel> = serde_json::from_str(raw).map_err(ParseChannelsError::Json)?;

    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut channels: Vec<ChannelConfig> = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let channel_id = entry.channel_id.trim().to_string();
        let section = entry.section.trim().to_string();
        if channel_id.is_empty() || section.is_empty() {
            return Err(ParseChannelsError::Entry(index));
        }

        match positions.get(&channel_id) {
            Some(&pos) => {
                warn!(%channel_id, "duplicate channel in list, keeping the later entry");
                channels[pos].section = section;
            }
            None => {
                positions.insert(channel_id.clone(), channels.len());
                channels.push(ChannelConfig {
                    channel_id,
                    section,
                });
            }
        }
    }

    Ok(channels)
}
