//! Per-channel sync.
//!
//! A channel with no stored videos is backfilled: its uploads playlist is
//! walked newest to oldest until the platform runs out of pages (or the
//! configured cap is reached). A channel with stored videos is synced
//! incrementally against its high-water mark, the newest stored publish
//! time: only strictly newer videos are kept, and paging stops at the first
//! page that reaches the mark. Since the playlist is newest-first, every
//! later page is older still.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use reel_core::{SyncSettings, VideoRecord};
use reel_db::models::Channel;
use reel_db::queries::{channels, videos};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::SyncError;
use crate::source::VideoSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Backfill when nothing is stored yet, otherwise incremental.
    Auto,
    /// Walk the whole playlist regardless of what is stored.
    Backfill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    Backfill { limit: Option<usize> },
    Incremental { since: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSyncReport {
    pub channel_id: String,
    pub plan: FetchPlan,
    pub pages: usize,
    pub fetched: usize,
    /// Videos that were not stored before this sync.
    pub added: i64,
}

/// A resolved channel: everything needed to page its uploads and stamp the
/// resulting records.
#[derive(Debug, Clone)]
struct SyncTarget {
    channel_id: String,
    title: String,
    section: String,
    uploads_playlist_id: String,
}

impl SyncTarget {
    /// Publish times are cut to the stored millisecond precision, so a
    /// record compares equal to its own stored copy against the mark.
    fn stamp(&self, mut record: VideoRecord) -> VideoRecord {
        record.published_at = record.published_at.trunc_subsecs(3);
        record.channel_id = self.channel_id.clone();
        record.section = self.section.clone();
        if record.channel_title.is_empty() {
            record.channel_title = self.title.clone();
        }
        record
    }
}

pub struct SyncEngine {
    db: SqlitePool,
    source: Arc<dyn VideoSource>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// A channel's slot in the in-flight set, released when dropped.
///
/// Claimed with [`SyncEngine::try_begin`] and handed to
/// [`SyncEngine::sync_with_permit`], so a caller can refuse a second sync
/// before spawning the first.
#[derive(Debug)]
pub struct SyncPermit {
    in_flight: Arc<Mutex<HashSet<String>>>,
    channel_id: String,
}

impl SyncPermit {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.channel_id);
    }
}

impl SyncEngine {
    pub fn new(
        db: SqlitePool,
        source: Arc<dyn VideoSource>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            db,
            source,
            clock,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Claim a channel's in-flight slot, or `AlreadyRunning` if a sync holds it.
    pub fn try_begin(&self, channel_id: &str) -> Result<SyncPermit, SyncError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(channel_id.to_string()) {
            return Err(SyncError::AlreadyRunning(channel_id.to_string()));
        }
        Ok(SyncPermit {
            in_flight: self.in_flight.clone(),
            channel_id: channel_id.to_string(),
        })
    }

    /// Sync one tracked channel.
    ///
    /// Pages are collected first and written in a single transaction, so a
    /// sync cancelled between pages leaves the store untouched and the
    /// high-water mark where it was.
    pub async fn sync_channel(
        &self,
        channel_id: &str,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<ChannelSyncReport, SyncError> {
        let permit = self.try_begin(channel_id)?;
        self.sync_with_permit(permit, mode, cancel).await
    }

    /// Sync the channel a permit was claimed for. The slot is released when
    /// this returns.
    pub async fn sync_with_permit(
        &self,
        permit: SyncPermit,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<ChannelSyncReport, SyncError> {
        let channel_id = permit.channel_id();

        let channel = channels::get_by_id(&self.db, channel_id)
            .await?
            .ok_or_else(|| SyncError::UnknownChannel(channel_id.to_string()))?;
        let target = self.resolve(&channel).await?;
        let plan = self.plan(channel_id, mode).await?;
        debug!(channel_id, ?plan, "channel sync starting");

        let (records, pages) = self.collect(&target, &plan, cancel).await?;

        let before = videos::count_for_channel(&self.db, channel_id).await?;
        videos::upsert_many(&self.db, &records, self.clock.now()).await?;
        let after = videos::count_for_channel(&self.db, channel_id).await?;

        let report = ChannelSyncReport {
            channel_id: channel_id.to_string(),
            plan,
            pages,
            fetched: records.len(),
            added: after - before,
        };
        info!(
            channel_id,
            pages = report.pages,
            fetched = report.fetched,
            added = report.added,
            "channel synced"
        );
        Ok(report)
    }

    /// Start tracking a channel after confirming it exists on the platform.
    ///
    /// Returns the stored row and whether it was newly created. An already
    /// tracked channel is returned as is, without a platform lookup.
    pub async fn add_channel(
        &self,
        channel_id: &str,
        section: &str,
    ) -> Result<(Channel, bool), SyncError> {
        if let Some(existing) = channels::get_by_id(&self.db, channel_id).await? {
            return Ok((existing, false));
        }

        let info = self
            .source
            .resolve_channel(channel_id)
            .await
            .ok_or_else(|| SyncError::NotFound(channel_id.to_string()))?;

        let created = channels::create_resolved(
            &self.db,
            channel_id,
            &info.title,
            section,
            &info.uploads_playlist_id,
            self.clock.now(),
        )
        .await?;

        let channel = channels::get_by_id(&self.db, channel_id)
            .await?
            .ok_or_else(|| SyncError::UnknownChannel(channel_id.to_string()))?;
        if created {
            info!(channel_id, section, title = %info.title, "channel added");
        }
        Ok((channel, created))
    }

    async fn resolve(&self, channel: &Channel) -> Result<SyncTarget, SyncError> {
        if let (Some(title), Some(uploads)) = (&channel.title, &channel.uploads_playlist_id) {
            return Ok(SyncTarget {
                channel_id: channel.id.clone(),
                title: title.clone(),
                section: channel.section.clone(),
                uploads_playlist_id: uploads.clone(),
            });
        }

        let info = self
            .source
            .resolve_channel(&channel.id)
            .await
            .ok_or_else(|| SyncError::UpstreamUnavailable(channel.id.clone()))?;
        channels::record_resolution(
            &self.db,
            &channel.id,
            &info.title,
            &info.uploads_playlist_id,
            self.clock.now(),
        )
        .await?;

        Ok(SyncTarget {
            channel_id: channel.id.clone(),
            title: info.title,
            section: channel.section.clone(),
            uploads_playlist_id: info.uploads_playlist_id,
        })
    }

    async fn plan(&self, channel_id: &str, mode: SyncMode) -> Result<FetchPlan, SyncError> {
        let limit = self.settings.backfill_limit;
        if mode == SyncMode::Backfill {
            return Ok(FetchPlan::Backfill { limit });
        }
        Ok(match videos::latest_published_at(&self.db, channel_id).await? {
            Some(since) => FetchPlan::Incremental { since },
            None => FetchPlan::Backfill { limit },
        })
    }

    async fn collect(
        &self,
        target: &SyncTarget,
        plan: &FetchPlan,
        cancel: &CancellationToken,
    ) -> Result<(Vec<VideoRecord>, usize), SyncError> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled(target.channel_id.clone()));
            }
            if pages > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(SyncError::Cancelled(target.channel_id.clone()));
                    }
                    _ = self.clock.sleep(self.settings.page_delay) => {}
                }
            }

            let page = self
                .source
                .list_uploads(
                    &target.uploads_playlist_id,
                    self.settings.page_size,
                    page_token.as_deref(),
                )
                .await;
            pages += 1;

            if page.items.is_empty() {
                break;
            }

            match plan {
                FetchPlan::Incremental { since } => {
                    let mut reached_mark = false;
                    for item in page.items.into_iter().map(|item| target.stamp(item)) {
                        if item.published_at > *since {
                            records.push(item);
                        } else {
                            reached_mark = true;
                        }
                    }
                    if reached_mark {
                        debug!(channel_id = %target.channel_id, pages, "reached high-water mark");
                        break;
                    }
                }
                FetchPlan::Backfill { limit } => {
                    records.extend(page.items.into_iter().map(|item| target.stamp(item)));
                    if let Some(limit) = *limit {
                        if records.len() >= limit {
                            records.truncate(limit);
                            break;
                        }
                    }
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok((records, pages))
    }
}
