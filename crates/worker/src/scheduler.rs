use std::sync::Arc;

use reel_db::format_timestamp;
use reel_db::queries::{channels, metadata, videos};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::engine::{SyncEngine, SyncMode};
use crate::error::SyncError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub channels: usize,
    pub synced: usize,
    pub failed: usize,
    pub new_videos: i64,
    pub cancelled: bool,
}

/// Runs a sync pass over every tracked channel, then waits out the
/// configured interval, until the shutdown token fires.
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    db: SqlitePool,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    pass_lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        db: SqlitePool,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            db,
            clock,
            shutdown,
            pass_lock: Mutex::new(()),
        }
    }

    pub async fn run(&self) {
        let settings = self.engine.settings().clone();
        info!(
            interval_secs = settings.interval.as_secs(),
            backfill_on_start = settings.backfill_on_start,
            "scheduler started"
        );

        if settings.backfill_on_start {
            if let Err(e) = self.initial_load().await {
                error!(error = %e, "initial load failed");
            }
        }

        while !self.shutdown.is_cancelled() {
            match self.run_pass(SyncMode::Auto).await {
                Ok(report) => info!(
                    channels = report.channels,
                    synced = report.synced,
                    failed = report.failed,
                    new_videos = report.new_videos,
                    cancelled = report.cancelled,
                    "sync pass finished"
                ),
                Err(e) => error!(error = %e, "sync pass failed"),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.clock.sleep(settings.interval) => {}
            }
        }

        info!("scheduler stopped");
    }

    /// Backfill every channel once, but only into an empty store.
    pub async fn initial_load(&self) -> Result<Option<PassReport>, sqlx::Error> {
        if videos::count(&self.db, None).await? > 0 {
            debug!("store already populated, skipping initial load");
            return Ok(None);
        }

        info!("initial load starting");
        let report = self.run_pass(SyncMode::Backfill).await?;
        if !report.cancelled {
            let total = videos::count(&self.db, None).await?;
            metadata::set_many(
                &self.db,
                &[
                    (
                        metadata::INITIAL_LOAD_COMPLETED,
                        format_timestamp(self.clock.now()),
                    ),
                    (metadata::INITIAL_VIDEOS_COUNT, total.to_string()),
                ],
            )
            .await?;
            info!(videos = total, "initial load completed");
        }
        Ok(Some(report))
    }

    /// Sync every tracked channel in turn, pausing between channels.
    ///
    /// A failing channel is logged and skipped. Completion is recorded in
    /// the metadata table unless the pass was cancelled.
    pub async fn run_pass(&self, mode: SyncMode) -> Result<PassReport, sqlx::Error> {
        let _pass = self.pass_lock.lock().await;
        let channel_delay = self.engine.settings().channel_delay;

        metadata::set(
            &self.db,
            metadata::LAST_SYNC_STARTED,
            &format_timestamp(self.clock.now()),
        )
        .await?;

        let tracked = channels::list(&self.db).await?;
        let mut report = PassReport {
            channels: tracked.len(),
            ..PassReport::default()
        };

        for (index, channel) in tracked.iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                    _ = self.clock.sleep(channel_delay) => {}
                }
            }

            match self.engine.sync_channel(&channel.id, mode, &self.shutdown).await {
                Ok(synced) => {
                    report.synced += 1;
                    report.new_videos += synced.added;
                }
                Err(SyncError::Cancelled(_)) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(channel_id = %channel.id, error = %e, "channel sync failed");
                }
            }
        }

        if !report.cancelled {
            metadata::set_many(
                &self.db,
                &[
                    (
                        metadata::LAST_SYNC_COMPLETED,
                        format_timestamp(self.clock.now()),
                    ),
                    (metadata::LAST_SYNC_NEW_VIDEOS, report.new_videos.to_string()),
                ],
            )
            .await?;
        }

        Ok(report)
    }
}
