//! Sync engine behavior: backfill, incremental high-water mark, pacing,
//! resolution and concurrency guards.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reel_db::queries::{channels, videos};
use reel_worker::{FetchPlan, ManualClock, SyncError, SyncMode};
use tokio_util::sync::CancellationToken;

use crate::common::*;

async fn track(db: &sqlx::SqlitePool, id: &str) {
    channels::create_resolved(db, id, "Film History", "history", PLAYLIST, base_time())
        .await
        .unwrap();
}

async fn stored_ids(db: &sqlx::SqlitePool, channel_id: &str) -> HashSet<String> {
    let all = videos::list_offset(db, None, 0, 1000).await.unwrap();
    all.into_iter()
        .filter(|v| v.channel_id == channel_id)
        .map(|v| v.id)
        .collect()
}

#[tokio::test]
async fn test_backfill_walks_every_page() {
    let db = setup_db().await;
    track(&db, "UC1").await;
    let source = Arc::new(
        FakeSource::new()
            .with_page(PLAYLIST, None, page(videos_desc(100, 51), Some("p2")))
            .with_page(PLAYLIST, Some("p2"), page(videos_desc(50, 1), None)),
    );
    let clock = Arc::new(ManualClock::new(base_time()));
    let engine = engine(&db, source.clone(), clock.clone(), quiet_settings());

    let report = engine
        .sync_channel("UC1", SyncMode::Auto, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.plan, FetchPlan::Backfill { limit: None });
    assert_eq!(report.pages, 2);
    assert_eq!(report.added, 100);
    assert_eq!(videos::count_for_channel(&db, "UC1").await.unwrap(), 100);
    assert_eq!(
        videos::latest_published_at(&db, "UC1").await.unwrap(),
        Some(t(100))
    );
    assert_eq!(
        source.requests(),
        vec![
            (PLAYLIST.to_string(), None),
            (PLAYLIST.to_string(), Some("p2".to_string())),
        ]
    );
    // One pacing delay between the two page fetches.
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(500)]);
}

#[tokio::test]
async fn test_records_are_stamped_with_channel_and_section() {
    let db = setup_db().await;
    track(&db, "UC1").await;
    let source =
        Arc::new(FakeSource::new().with_page(PLAYLIST, None, page(videos_desc(2, 1), None)));
    let engine = engine(
        &db,
        source,
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );

    engine
        .sync_channel("UC1", SyncMode::Auto, &CancellationToken::new())
        .await
        .unwrap();

    let stored = videos::get_by_id(&db, "v2").await.unwrap().unwrap();
    assert_eq!(stored.channel_id, "UC1");
    assert_eq!(stored.section, "history");
    assert_eq!(stored.channel_title, "Film History");
}

#[tokio::test]
async fn test_incremental_stops_at_high_water_mark() {
    let db = setup_db().await;
    track(&db, "UC1").await;
    let mut known = video("known5", 5);
    known.channel_id = "UC1".to_string();
    known.section = "history".to_string();
    videos::upsert_many(&db, &[known], base_time()).await.unwrap();

    let source = Arc::new(
        FakeSource::new()
            .with_page(PLAYLIST, None, page(videos_desc(9, 7), Some("p2")))
            .with_page(PLAYLIST, Some("p2"), page(videos_desc(6, 4), Some("p3")))
            .with_page(PLAYLIST, Some("p3"), page(videos_desc(3, 1), None)),
    );
    let engine = engine(
        &db,
        source.clone(),
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );

    let report = engine
        .sync_channel("UC1", SyncMode::Auto, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.plan, FetchPlan::Incremental { since: t(5) });
    assert_eq!(report.pages, 2);
    assert_eq!(report.added, 4);
    assert_eq!(source.requests().len(), 2);

    let ids = stored_ids(&db, "UC1").await;
    let expected: HashSet<String> = ["known5", "v9", "v8", "v7", "v6"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    // v5 ties the mark and v4 is older: neither is new.
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_incremental_with_nothing_new_writes_nothing() {
    let db = setup_db().await;
    track(&db, "UC1").await;
    let mut known = video("v3", 3);
    known.channel_id = "UC1".to_string();
    videos::upsert_many(&db, &[known], base_time()).await.unwrap();

    let source = Arc::new(
        FakeSource::new()
            .with_page(PLAYLIST, None, page(videos_desc(3, 1), Some("p2"))),
    );
    let engine = engine(
        &db,
        source.clone(),
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );

    let report = engine
        .sync_channel("UC1", SyncMode::Auto, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.fetched, 0);
    assert_eq!(report.added, 0);
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test]
async fn test_forced_backfill_ignores_high_water_mark() {
    let db = setup_db().await;
    track(&db, "UC1").await;
    let mut known = video("v5", 5);
    known.channel_id = "UC1".to_string();
    videos::upsert_many(&db, &[known], base_time()).await.unwrap();

    let source = Arc::new(
        FakeSource::new()
            .with_page(PLAYLIST, None, page(videos_desc(6, 4), Some("p2")))
            .with_page(PLAYLIST, Some("p2"), page(videos_desc(3, 1), None)),
    );
    let engine = engine(
        &db,
        source.clone(),
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );

    let report = engine
        .sync_channel("UC1", SyncMode::Backfill, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.plan, FetchPlan::Backfill { limit: None });
    assert_eq!(report.fetched, 6);
    assert_eq!(report.added, 5);
    assert_eq!(source.requests().len(), 2);
}

#[tokio::test]
async fn test_bounded_backfill_truncates_last_page() {
    let db = setup_db().await;
    track(&db, "UC1").await;
    let source = Arc::new(
        FakeSource::new()
            .with_page(PLAYLIST, None, page(videos_desc(150, 101), Some("p2")))
            .with_page(PLAYLIST, Some("p2"), page(videos_desc(100, 51), Some("p3")))
            .with_page(PLAYLIST, Some("p3"), page(videos_desc(50, 1), None)),
    );
    let settings = reel_core::SyncSettings {
        backfill_limit: Some(60),
        ..quiet_settings()
    };
    let engine = engine(
        &db,
        source.clone(),
        Arc::new(ManualClock::new(base_time())),
        settings,
    );

    let report = engine
        .sync_channel("UC1", SyncMode::Auto, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.plan, FetchPlan::Backfill { limit: Some(60) });
    assert_eq!(report.added, 60);
    assert_eq!(source.requests().len(), 2);
    assert!(videos::get_by_id(&db, "v91").await.unwrap().is_some());
    assert!(videos::get_by_id(&db, "v90").await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_page_ends_paging() {
    let db = setup_db().await;
    track(&db, "UC1").await;
    let source = Arc::new(
        FakeSource::new()
            .with_page(PLAYLIST, None, page(videos_desc(10, 6), Some("p2")))
            // "p2" is unscripted and comes back empty, as after an upstream failure.
            .with_page(PLAYLIST, Some("p3"), page(videos_desc(5, 1), None)),
    );
    let engine = engine(
        &db,
        source.clone(),
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );

    let report = engine
        .sync_channel("UC1", SyncMode::Auto, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.added, 5);
    assert_eq!(source.requests().len(), 2);
}

#[tokio::test]
async fn test_unresolvable_channel_is_skipped() {
    let db = setup_db().await;
    channels::upsert_configured(&db, "UCgone", "history", base_time())
        .await
        .unwrap();
    let source = Arc::new(FakeSource::new());
    let engine = engine(
        &db,
        source.clone(),
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );

    let err = engine
        .sync_channel("UCgone", SyncMode::Auto, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::UpstreamUnavailable(id) if id == "UCgone"));
    assert!(source.requests().is_empty());
    assert!(engine.try_begin("UCgone").is_ok());
}

#[tokio::test]
async fn test_resolution_is_cached_on_the_channel() {
    let db = setup_db().await;
    channels::upsert_configured(&db, "UC1", "history", base_time())
        .await
        .unwrap();
    let source = Arc::new(
        FakeSource::new()
            .with_channel("UC1", "Film History", PLAYLIST)
            .with_page(PLAYLIST, None, page(videos_desc(2, 1), None)),
    );
    let engine = engine(
        &db,
        source.clone(),
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );
    let cancel = CancellationToken::new();

    engine.sync_channel("UC1", SyncMode::Auto, &cancel).await.unwrap();
    engine.sync_channel("UC1", SyncMode::Auto, &cancel).await.unwrap();

    assert_eq!(source.resolve_calls(), 1);
    let channel = channels::get_by_id(&db, "UC1").await.unwrap().unwrap();
    assert_eq!(channel.title.as_deref(), Some("Film History"));
    assert_eq!(channel.uploads_playlist_id.as_deref(), Some(PLAYLIST));
}

#[tokio::test]
async fn test_untracked_channel_is_rejected() {
    let db = setup_db().await;
    let engine = engine(
        &db,
        Arc::new(FakeSource::new()),
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );

    let err = engine
        .sync_channel("UCnope", SyncMode::Auto, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::UnknownChannel(_)));
}

#[tokio::test]
async fn test_concurrent_sync_is_refused_and_cancel_writes_nothing() {
    let db = setup_db().await;
    track(&db, "UC1").await;
    let source = Arc::new(
        FakeSource::new()
            .with_page(PLAYLIST, None, page(videos_desc(10, 6), Some("p2")))
            .with_page(PLAYLIST, Some("p2"), page(videos_desc(5, 1), None)),
    );
    let clock = Arc::new(ParkingClock::new(base_time()));
    let engine = engine(&db, source.clone(), clock.clone(), quiet_settings());
    let cancel = CancellationToken::new();

    let running = tokio::spawn({
        let engine = engine.clone();
        let cancel = cancel.clone();
        async move { engine.sync_channel("UC1", SyncMode::Auto, &cancel).await }
    });

    // The first sync is now parked in the pacing delay after page one.
    clock.wait_until_parked().await;
    assert!(matches!(
        engine.try_begin("UC1"),
        Err(SyncError::AlreadyRunning(_))
    ));

    let err = engine
        .sync_channel("UC1", SyncMode::Auto, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AlreadyRunning(_)));

    cancel.cancel();
    let result = running.await.unwrap();

    assert!(matches!(result, Err(SyncError::Cancelled(_))));
    assert_eq!(source.requests().len(), 1);
    assert_eq!(videos::count_for_channel(&db, "UC1").await.unwrap(), 0);
    assert!(engine.try_begin("UC1").is_ok());
}

#[tokio::test]
async fn test_permit_reserves_the_channel() {
    let db = setup_db().await;
    track(&db, "UC1").await;
    let source =
        Arc::new(FakeSource::new().with_page(PLAYLIST, None, page(videos_desc(3, 1), None)));
    let engine = engine(
        &db,
        source.clone(),
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );
    let cancel = CancellationToken::new();

    let permit = engine.try_begin("UC1").unwrap();
    assert_eq!(permit.channel_id(), "UC1");
    let err = engine
        .sync_channel("UC1", SyncMode::Auto, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AlreadyRunning(id) if id == "UC1"));
    assert!(source.requests().is_empty());

    let report = engine
        .sync_with_permit(permit, SyncMode::Auto, &cancel)
        .await
        .unwrap();
    assert_eq!(report.added, 3);
    assert!(engine.try_begin("UC1").is_ok());
}

#[tokio::test]
async fn test_sub_millisecond_publish_times_match_the_stored_mark() {
    let db = setup_db().await;
    track(&db, "UC1").await;
    let mut precise = video("v1", 1);
    precise.published_at = t(1) + chrono::Duration::microseconds(123_456);
    let source = Arc::new(FakeSource::new().with_page(PLAYLIST, None, page(vec![precise], None)));
    let engine = engine(
        &db,
        source,
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );
    let cancel = CancellationToken::new();

    let first = engine.sync_channel("UC1", SyncMode::Auto, &cancel).await.unwrap();
    assert_eq!(first.added, 1);
    let mark = t(1) + chrono::Duration::milliseconds(123);
    assert_eq!(
        videos::latest_published_at(&db, "UC1").await.unwrap(),
        Some(mark)
    );

    let second = engine.sync_channel("UC1", SyncMode::Auto, &cancel).await.unwrap();
    assert_eq!(second.plan, FetchPlan::Incremental { since: mark });
    assert_eq!(second.fetched, 0);
    assert_eq!(second.added, 0);
}

#[tokio::test]
async fn test_add_channel() {
    let db = setup_db().await;
    let source = Arc::new(FakeSource::new().with_channel("UC1", "Film History", PLAYLIST));
    let engine = engine(
        &db,
        source.clone(),
        Arc::new(ManualClock::new(base_time())),
        quiet_settings(),
    );

    let (channel, created) = engine.add_channel("UC1", "cinema").await.unwrap();
    assert!(created);
    assert_eq!(channel.section, "cinema");
    assert_eq!(channel.uploads_playlist_id.as_deref(), Some(PLAYLIST));

    let (again, created) = engine.add_channel("UC1", "history").await.unwrap();
    assert!(!created);
    assert_eq!(again.section, "cinema");
    assert_eq!(source.resolve_calls(), 1);

    let err = engine.add_channel("UCnope", "cinema").await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(id) if id == "UCnope"));
    assert!(channels::get_by_id(&db, "UCnope").await.unwrap().is_none());
}
