pub mod clock;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod source;
pub mod youtube;

use chrono::{DateTime, Utc};
use reel_core::ChannelConfig;
use reel_db::queries::channels;
use sqlx::SqlitePool;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{ChannelSyncReport, FetchPlan, SyncEngine, SyncMode, SyncPermit};
pub use error::SyncError;
pub use scheduler::{PassReport, Scheduler};
pub use source::VideoSource;
pub use youtube::YouTubeClient;

/// Make sure every configured channel has a row, with its configured section.
pub async fn seed_channels(
    db: &SqlitePool,
    configured: &[ChannelConfig],
    now: DateTime<Utc>,
) -> Result<usize, sqlx::Error> {
    for entry in configured {
        channels::upsert_configured(db, &entry.channel_id, &entry.section, now).await?;
    }
    tracing::info!(channels = configured.len(), "configured channels seeded");
    Ok(configured.len())
}

/// Cancel `token` on SIGINT or SIGTERM.
pub async fn shutdown_signal(token: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
    token.cancel();
}
