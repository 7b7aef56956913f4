use std::net::SocketAddr;
use std::sync::Arc;

use reel_api::state::AppState;
use reel_core::{load_channels, Settings};
use reel_worker::{
    seed_channels, shutdown_signal, Clock, Scheduler, SyncEngine, SystemClock, YouTubeClient,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()?;

    let db = reel_db::connect(&settings.database_url).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let configured = load_channels(&settings.channels_file)?;
    seed_channels(&db, &configured, clock.now()).await?;

    let source = Arc::new(YouTubeClient::new(
        settings.youtube_api_key.clone(),
        settings.youtube_base_url.clone(),
    )?);
    let engine = Arc::new(SyncEngine::new(
        db.clone(),
        source,
        clock.clone(),
        settings.sync.clone(),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let scheduler_task = if settings.scheduler_enabled {
        let scheduler = Scheduler::new(engine.clone(), db.clone(), clock, shutdown.clone());
        Some(tokio::spawn(async move { scheduler.run().await }))
    } else {
        info!("scheduler disabled");
        None
    };

    let state = AppState {
        db,
        engine,
        shutdown: shutdown.clone(),
        reel_env: settings.reel_env.clone(),
    };
    let app = reel_api::app(state);

    let addr: SocketAddr = settings.api_bind.parse()?;
    info!(%addr, env = %settings.reel_env, "starting api");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    if let Some(task) = scheduler_task {
        task.await?;
    }
    info!("api stopped");

    Ok(())
}
