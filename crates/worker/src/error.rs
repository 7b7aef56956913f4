/// Failures of a single channel sync.
///
/// Only `Store` indicates a fault on our side; everything else is an expected
/// condition that the scheduler logs and retries on the next pass.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("channel {0} is not tracked")]
    UnknownChannel(String),
    #[error("channel {0} was not found on the platform")]
    NotFound(String),
    #[error("platform unavailable for channel {0}")]
    UpstreamUnavailable(String),
    #[error("a sync of channel {0} is already running")]
    AlreadyRunning(String),
    #[error("sync of channel {0} was cancelled")]
    Cancelled(String),
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}
