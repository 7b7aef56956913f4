pub mod config;
pub mod types;

pub use config::{load_channels, ConfigError, Settings, SyncSettings};
pub use types::{
    section_filter, ChannelConfig, ChannelInfo, UploadsPage, VideoRecord, ALL_SECTIONS,
};
