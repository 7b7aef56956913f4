//! SQLite persistence for tracked channels, their videos and sync bookkeeping.

pub mod models;
pub mod pool;

pub mod queries {
    pub mod channels;
    pub mod metadata;
    pub mod videos;
}

pub use models::{format_timestamp, parse_timestamp};
pub use pool::{connect, in_memory};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("unknown cursor {0}")]
    InvalidCursor(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
