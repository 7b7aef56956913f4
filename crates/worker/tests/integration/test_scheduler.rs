//! Scheduler passes: failure isolation, bookkeeping, initial load and the
//! cancellable interval loop.

use std::sync::Arc;
use std::time::Duration;

use reel_db::queries::{channels, metadata, videos};
use reel_worker::{ManualClock, Scheduler, SyncMode};
use tokio_util::sync::CancellationToken;

use crate::common::*;

const OTHER_PLAYLIST: &str = "UU_other";

/// UC1 and UC3 resolve and have uploads; UC2 cannot be resolved.
async fn setup_channels(db: &sqlx::SqlitePool) -> Arc<FakeSource> {
    for id in ["UC1", "UC2", "UC3"] {
        channels::upsert_configured(db, id, "history", base_time())
            .await
            .unwrap();
    }
    Arc::new(
        FakeSource::new()
            .with_channel("UC1", "One", PLAYLIST)
            .with_channel("UC3", "Three", OTHER_PLAYLIST)
            .with_page(PLAYLIST, None, page(videos_desc(3, 1), None))
            .with_page(
                OTHER_PLAYLIST,
                None,
                page(vec![video("w1", 1), video("w2", 2)], None),
            ),
    )
}

#[tokio::test]
async fn test_pass_isolates_channel_failures() {
    let db = setup_db().await;
    let source = setup_channels(&db).await;
    let clock = Arc::new(ManualClock::new(base_time()));
    let engine = engine(&db, source, clock.clone(), quiet_settings());
    let scheduler = Scheduler::new(engine, db.clone(), clock.clone(), CancellationToken::new());

    let report = scheduler.run_pass(SyncMode::Auto).await.unwrap();

    assert_eq!(report.channels, 3);
    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.new_videos, 5);
    assert!(!report.cancelled);
    assert_eq!(videos::count(&db, None).await.unwrap(), 5);

    // Pacing between the three channels.
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 2]);

    assert_eq!(
        metadata::get(&db, metadata::LAST_SYNC_NEW_VIDEOS)
            .await
            .unwrap()
            .as_deref(),
        Some("5")
    );
    assert!(metadata::get(&db, metadata::LAST_SYNC_COMPLETED)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_second_pass_counts_only_new_videos() {
    let db = setup_db().await;
    let source = setup_channels(&db).await;
    let clock = Arc::new(ManualClock::new(base_time()));
    let engine = engine(&db, source, clock.clone(), quiet_settings());
    let scheduler = Scheduler::new(engine, db.clone(), clock, CancellationToken::new());

    scheduler.run_pass(SyncMode::Auto).await.unwrap();
    let report = scheduler.run_pass(SyncMode::Auto).await.unwrap();

    assert_eq!(report.synced, 2);
    assert_eq!(report.new_videos, 0);
    assert_eq!(
        metadata::get(&db, metadata::LAST_SYNC_NEW_VIDEOS)
            .await
            .unwrap()
            .as_deref(),
        Some("0")
    );
}

#[tokio::test]
async fn test_cancelled_pass_is_not_recorded_as_completed() {
    let db = setup_db().await;
    let source = setup_channels(&db).await;
    let clock = Arc::new(ManualClock::new(base_time()));
    let engine = engine(&db, source, clock.clone(), quiet_settings());
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let scheduler = Scheduler::new(engine, db.clone(), clock, shutdown);

    let report = scheduler.run_pass(SyncMode::Auto).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.synced, 0);
    assert_eq!(videos::count(&db, None).await.unwrap(), 0);
    assert!(metadata::get(&db, metadata::LAST_SYNC_STARTED)
        .await
        .unwrap()
        .is_some());
    assert!(metadata::get(&db, metadata::LAST_SYNC_COMPLETED)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_initial_load_only_runs_on_empty_store() {
    let db = setup_db().await;
    let source = setup_channels(&db).await;
    let clock = Arc::new(ManualClock::new(base_time()));
    let engine = engine(&db, source, clock.clone(), quiet_settings());
    let scheduler = Scheduler::new(engine, db.clone(), clock, CancellationToken::new());

    let first = scheduler.initial_load().await.unwrap();
    assert_eq!(first.map(|r| r.new_videos), Some(5));
    assert_eq!(
        metadata::get(&db, metadata::INITIAL_VIDEOS_COUNT)
            .await
            .unwrap()
            .as_deref(),
        Some("5")
    );
    assert!(metadata::get(&db, metadata::INITIAL_LOAD_COMPLETED)
        .await
        .unwrap()
        .is_some());

    let second = scheduler.initial_load().await.unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn test_run_loops_until_shutdown() {
    let db = setup_db().await;
    let source = setup_channels(&db).await;
    let settings = quiet_settings();
    let shutdown = CancellationToken::new();
    let clock = Arc::new(StopAfterClock::new(settings.interval, 2, shutdown.clone()));
    let engine = engine(&db, source.clone(), clock.clone(), settings.clone());
    let scheduler = Scheduler::new(engine, db.clone(), clock.clone(), shutdown);

    scheduler.run().await;

    let interval_sleeps = clock
        .sleeps()
        .into_iter()
        .filter(|d| *d == settings.interval)
        .count();
    assert_eq!(interval_sleeps, 2);

    // Initial load plus two passes, one uploads request per resolvable channel each.
    assert_eq!(source.requests().len(), 6);
    assert_eq!(videos::count(&db, None).await.unwrap(), 5);
    assert!(metadata::get(&db, metadata::INITIAL_LOAD_COMPLETED)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_run_skips_initial_load_when_disabled() {
    let db = setup_db().await;
    let source = setup_channels(&db).await;
    let settings = reel_core::SyncSettings {
        backfill_on_start: false,
        ..quiet_settings()
    };
    let shutdown = CancellationToken::new();
    let clock = Arc::new(StopAfterClock::new(settings.interval, 1, shutdown.clone()));
    let engine = engine(&db, source, clock.clone(), settings);
    let scheduler = Scheduler::new(engine, db.clone(), clock, shutdown);

    scheduler.run().await;

    assert!(metadata::get(&db, metadata::INITIAL_LOAD_COMPLETED)
        .await
        .unwrap()
        .is_none());
    assert_eq!(videos::count(&db, None).await.unwrap(), 5);
}
